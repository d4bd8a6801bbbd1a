// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Page pinning.
//!
//! The operating system pins memory in whole pages. A request for `b` bytes at address `a` therefore pins the extent
//! `[floor(a / P) * P, ceil((a + b) / P) * P)` where `P` is the page size. Two small allocations can share a page, so
//! [`SystemLocker`] counts pins per page: a page is only locked by the first region that covers it and only unlocked
//! once the last covering region is released.

use crate::MemoryError;

use log::trace;

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

const FALLBACK_PAGE_SIZE: usize = 4096;

lazy_static! {
    static ref PAGE_SIZE: usize = query_page_size();
    static ref PINS: Mutex<HashMap<usize, usize>> = Mutex::new(HashMap::new());
}

/// Returns the page size of the running system. The value is queried once.
pub fn page_size() -> usize {
    *PAGE_SIZE
}

#[cfg(unix)]
fn query_page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(windows)]
fn query_page_size() -> usize {
    use windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

    let mut info = SYSTEM_INFO::default();
    unsafe { GetSystemInfo(&mut info) };

    match info.dwPageSize as usize {
        0 => FALLBACK_PAGE_SIZE,
        size => size,
    }
}

/// The page-aligned extent covering a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageExtent {
    start: usize,
    len: usize,
    page_size: usize,
}

impl PageExtent {
    /// Rounds `[addr, addr + len)` outwards to the system's page boundaries.
    pub fn covering(addr: usize, len: usize) -> Self {
        Self::with_page_size(addr, len, page_size())
    }

    /// Rounds `[addr, addr + len)` outwards to multiples of `page_size`, which must be a power of two.
    pub fn with_page_size(addr: usize, len: usize, page_size: usize) -> Self {
        debug_assert!(page_size.is_power_of_two());

        let start = addr & !(page_size - 1);
        if len == 0 {
            return Self {
                start,
                len: 0,
                page_size,
            };
        }

        let last = addr.saturating_add(len - 1);
        let end = (last | (page_size - 1)).saturating_add(1);

        Self {
            start,
            len: end - start,
            page_size,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base addresses of every page in the extent, ascending.
    pub fn pages(&self) -> impl Iterator<Item = usize> {
        (self.start..self.end()).step_by(self.page_size)
    }
}

/// The primitive used by [`LockedAllocator`](crate::LockedAllocator) to keep regions out of swap.
///
/// Implementations take the exact byte range of a region; any rounding to page boundaries is their own business.
/// Lockers carry no state of their own so that allocators parameterized over them stay zero-sized.
pub trait PageLocker: 'static {
    /// Pins `[ptr, ptr + len)` into physical memory.
    fn lock(ptr: *const u8, len: usize) -> Result<(), MemoryError>;

    /// Releases a pin taken with [`PageLocker::lock`] over the same range.
    fn unlock(ptr: *const u8, len: usize) -> Result<(), MemoryError>;
}

/// Pins pages through the operating system (`mlock`/`munlock`, `VirtualLock`/`VirtualUnlock`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemLocker;

impl SystemLocker {
    /// Returns `true` while at least one live region pins the page containing `ptr`.
    pub fn is_pinned(ptr: *const u8) -> bool {
        let page = PageExtent::covering(ptr as usize, 1).start();
        pins().get(&page).map_or(false, |count| *count > 0)
    }
}

fn pins() -> MutexGuard<'static, HashMap<usize, usize>> {
    PINS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Merges ascending page addresses into `(start, len)` runs of adjacent pages.
fn runs(pages: &[usize], page_size: usize) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for &page in pages {
        match runs.last_mut() {
            Some((start, len)) if *start + *len == page => *len += page_size,
            _ => runs.push((page, page_size)),
        }
    }
    runs
}

impl PageLocker for SystemLocker {
    fn lock(ptr: *const u8, len: usize) -> Result<(), MemoryError> {
        if len == 0 {
            return Ok(());
        }

        let extent = PageExtent::covering(ptr as usize, len);
        let mut pins = pins();

        let fresh: Vec<usize> = extent.pages().filter(|page| !pins.contains_key(page)).collect();
        let mut locked = Vec::new();

        for (start, run_len) in runs(&fresh, extent.page_size) {
            if let Err(reason) = unsafe { os::lock(start, run_len) } {
                for (start, run_len) in locked {
                    let _ = unsafe { os::unlock(start, run_len) };
                }
                return Err(MemoryError::LockFailed { size: len, reason });
            }
            locked.push((start, run_len));
        }

        for page in extent.pages() {
            *pins.entry(page).or_insert(0) += 1;
        }

        trace!(
            "pinned {} bytes over {} pages ({} newly locked)",
            len,
            extent.len() / extent.page_size,
            fresh.len()
        );

        Ok(())
    }

    fn unlock(ptr: *const u8, len: usize) -> Result<(), MemoryError> {
        if len == 0 {
            return Ok(());
        }

        let extent = PageExtent::covering(ptr as usize, len);
        let mut pins = pins();

        let mut released = Vec::new();
        for page in extent.pages() {
            match pins.get_mut(&page) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    pins.remove(&page);
                    released.push(page);
                }
                None => {}
            }
        }

        let mut result = Ok(());
        for (start, run_len) in runs(&released, extent.page_size) {
            if let Err(reason) = unsafe { os::unlock(start, run_len) } {
                if result.is_ok() {
                    result = Err(MemoryError::UnlockFailed { size: len, reason });
                }
            }
        }

        trace!("unpinned {} bytes ({} pages released)", len, released.len());

        result
    }
}

#[cfg(unix)]
mod os {
    use nix::sys::mman;

    pub(super) unsafe fn lock(start: usize, len: usize) -> Result<(), String> {
        mman::mlock(start as *const libc::c_void, len).map_err(|e| format!("mlock: {}", e))
    }

    pub(super) unsafe fn unlock(start: usize, len: usize) -> Result<(), String> {
        mman::munlock(start as *const libc::c_void, len).map_err(|e| format!("munlock: {}", e))
    }
}

#[cfg(windows)]
mod os {
    use windows::Win32::System::Memory::{VirtualLock, VirtualUnlock};

    // VirtualLock keeps pages in the working set. The pagefile is still used when the system is starved, there is
    // no stronger guarantee on this platform.
    pub(super) unsafe fn lock(start: usize, len: usize) -> Result<(), String> {
        if VirtualLock(start as *const _, len).as_bool() {
            Ok(())
        } else {
            Err(format!("VirtualLock: {}", windows::core::Error::from_win32()))
        }
    }

    pub(super) unsafe fn unlock(start: usize, len: usize) -> Result<(), String> {
        if VirtualUnlock(start as *const _, len).as_bool() {
            Ok(())
        } else {
            Err(format!("VirtualUnlock: {}", windows::core::Error::from_win32()))
        }
    }
}
