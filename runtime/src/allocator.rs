// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::{
    locker::{PageLocker, SystemLocker},
    MemoryError,
};

use core::{
    alloc::Layout,
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    mem::MaybeUninit,
    ptr::NonNull,
    slice,
};

use log::{trace, warn};
use zeroize::Zeroize;

/// The capability secure containers are parameterized over.
///
/// Allocators are stateless strategies: every instance for a given `T` is interchangeable with every other, and with
/// any instance rebound to another element type. Containers may therefore hand storage from one instance to another.
pub trait SecureAllocator<T>: Clone + Default + Send + Sync {
    /// The same strategy for another element type.
    type Rebind<U>: SecureAllocator<U>;

    /// Obtains storage for `n` contiguous values of `T`.
    ///
    /// A request of zero bytes yields a dangling pointer and touches no storage.
    fn allocate(&self, n: usize) -> Result<NonNull<T>, MemoryError>;

    /// Zeroes and releases storage obtained from [`SecureAllocator::allocate`]. A null `ptr` is a no-op.
    ///
    /// # Safety
    /// `ptr` must be null or have been returned by `allocate(n)` on an allocator equal to `self`, with the same `n`,
    /// and must not have been released already.
    unsafe fn deallocate(&self, ptr: *mut T, n: usize);

    fn rebind<U>(&self) -> Self::Rebind<U> {
        Default::default()
    }
}

fn array_layout<T>(n: usize) -> Result<Layout, MemoryError> {
    Layout::array::<T>(n).map_err(|_| MemoryError::CapacityOverflow)
}

fn system_allocate<T>(layout: Layout) -> Result<NonNull<T>, MemoryError> {
    let ptr = unsafe { std::alloc::alloc(layout) } as *mut T;
    NonNull::new(ptr).ok_or(MemoryError::OutOfMemory { size: layout.size() })
}

/// Overwrites `size` bytes at `ptr` with zeroes. The writes are volatile and fenced, they survive optimization even
/// though the memory is released right after.
unsafe fn wipe(ptr: *mut u8, size: usize) {
    slice::from_raw_parts_mut(ptr as *mut MaybeUninit<u8>, size).zeroize();
}

/// An allocator that keeps its regions out of swap and clears them before releasing them.
///
/// On release the order is: zero, unpin, free. Unpinning first would let the zeroing writes themselves hit swap.
pub struct LockedAllocator<T, L: PageLocker = SystemLocker> {
    _marker: PhantomData<fn() -> (T, L)>,
}

impl<T, L: PageLocker> LockedAllocator<T, L> {
    pub const fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T, L: PageLocker> SecureAllocator<T> for LockedAllocator<T, L> {
    type Rebind<U> = LockedAllocator<U, L>;

    fn allocate(&self, n: usize) -> Result<NonNull<T>, MemoryError> {
        let layout = array_layout::<T>(n)?;
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }

        let ptr = system_allocate::<T>(layout)?;

        // never hand out a region that is not pinned
        if let Err(e) = L::lock(ptr.as_ptr() as *const u8, layout.size()) {
            unsafe { std::alloc::dealloc(ptr.as_ptr() as *mut u8, layout) };
            return Err(e);
        }

        trace!("allocated {} locked bytes", layout.size());

        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: *mut T, n: usize) {
        let layout = match array_layout::<T>(n) {
            Ok(layout) if layout.size() != 0 && !ptr.is_null() => layout,
            _ => return,
        };

        wipe(ptr as *mut u8, layout.size());

        if let Err(e) = L::unlock(ptr as *const u8, layout.size()) {
            warn!("releasing locked region: {}", e);
        }

        std::alloc::dealloc(ptr as *mut u8, layout);

        trace!("released {} locked bytes", layout.size());
    }
}

impl<T, L: PageLocker> Default for LockedAllocator<T, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, L: PageLocker> Clone for LockedAllocator<T, L> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T, L: PageLocker> Copy for LockedAllocator<T, L> {}

impl<T, U, L: PageLocker> PartialEq<LockedAllocator<U, L>> for LockedAllocator<T, L> {
    fn eq(&self, _: &LockedAllocator<U, L>) -> bool {
        true
    }
}

impl<T, L: PageLocker> Eq for LockedAllocator<T, L> {}

impl<T, L: PageLocker> Debug for LockedAllocator<T, L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("LockedAllocator")
    }
}

/// An allocator that clears its regions before releasing them, without pinning.
pub struct ZeroingAllocator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ZeroingAllocator<T> {
    pub const fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> SecureAllocator<T> for ZeroingAllocator<T> {
    type Rebind<U> = ZeroingAllocator<U>;

    fn allocate(&self, n: usize) -> Result<NonNull<T>, MemoryError> {
        let layout = array_layout::<T>(n)?;
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }

        let ptr = system_allocate::<T>(layout)?;
        trace!("allocated {} zeroing bytes", layout.size());

        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: *mut T, n: usize) {
        let layout = match array_layout::<T>(n) {
            Ok(layout) if layout.size() != 0 && !ptr.is_null() => layout,
            _ => return,
        };

        wipe(ptr as *mut u8, layout.size());
        std::alloc::dealloc(ptr as *mut u8, layout);

        trace!("released {} zeroing bytes", layout.size());
    }
}

impl<T> Default for ZeroingAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ZeroingAllocator<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Copy for ZeroingAllocator<T> {}

impl<T, U> PartialEq<ZeroingAllocator<U>> for ZeroingAllocator<T> {
    fn eq(&self, _: &ZeroingAllocator<U>) -> bool {
        true
    }
}

impl<T> Eq for ZeroingAllocator<T> {}

impl<T> Debug for ZeroingAllocator<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("ZeroingAllocator")
    }
}
