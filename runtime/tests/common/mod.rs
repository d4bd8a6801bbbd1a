// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use runtime::{LockedAllocator, MemoryError, PageLocker, SecureBytes, SecureString};

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    slice,
};

/// A region handed back to the locker, observed right before it was unpinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    pub addr: usize,
    pub len: usize,
    pub zeroed: bool,
}

thread_local! {
    static FAIL_NEXT: Cell<bool> = Cell::new(false);
    static PINNED: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
    static RELEASES: RefCell<Vec<Release>> = RefCell::new(Vec::new());
}

/// Records exact regions instead of pinning pages, and fails on demand.
///
/// State is kept per thread, every test sees only its own regions.
pub struct StubLocker;

impl StubLocker {
    /// Makes the next `lock` call fail.
    pub fn fail_next() {
        FAIL_NEXT.with(|f| f.set(true));
    }

    pub fn pinned() -> Vec<(usize, usize)> {
        let mut regions: Vec<_> = PINNED.with(|p| p.borrow().iter().map(|(a, l)| (*a, *l)).collect());
        regions.sort_unstable();
        regions
    }

    pub fn is_pinned(ptr: *const u8, len: usize) -> bool {
        PINNED.with(|p| p.borrow().get(&(ptr as usize)) == Some(&len))
    }

    pub fn take_releases() -> Vec<Release> {
        RELEASES.with(|r| r.borrow_mut().drain(..).collect())
    }

    pub fn reset() {
        FAIL_NEXT.with(|f| f.set(false));
        PINNED.with(|p| p.borrow_mut().clear());
        RELEASES.with(|r| r.borrow_mut().clear());
    }
}

impl PageLocker for StubLocker {
    fn lock(ptr: *const u8, len: usize) -> Result<(), MemoryError> {
        if FAIL_NEXT.with(|f| f.replace(false)) {
            return Err(MemoryError::LockFailed {
                size: len,
                reason: "stubbed failure".into(),
            });
        }

        PINNED.with(|p| p.borrow_mut().insert(ptr as usize, len));
        Ok(())
    }

    fn unlock(ptr: *const u8, len: usize) -> Result<(), MemoryError> {
        let zeroed = unsafe { slice::from_raw_parts(ptr, len) }.iter().all(|b| *b == 0);

        RELEASES.with(|r| {
            r.borrow_mut().push(Release {
                addr: ptr as usize,
                len,
                zeroed,
            })
        });

        match PINNED.with(|p| p.borrow_mut().remove(&(ptr as usize))) {
            Some(pinned) if pinned == len => Ok(()),
            _ => Err(MemoryError::UnlockFailed {
                size: len,
                reason: "region was not pinned".into(),
            }),
        }
    }
}

pub type StubAllocator = LockedAllocator<u8, StubLocker>;
pub type StubBytes = SecureBytes<StubAllocator>;
pub type StubString = SecureString<StubAllocator>;
