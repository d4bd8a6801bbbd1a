// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::{
    allocator::{LockedAllocator, SecureAllocator, ZeroingAllocator},
    MemoryError, DEBUG_MSG,
};

use core::{
    borrow::Borrow,
    cmp::{self, Ordering},
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    marker::PhantomData,
    mem,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
    slice,
};

use std::io;

use log::{debug, error};
use serde::{
    de::{self, Deserialize, Deserializer, SeqAccess, Visitor},
    ser::{Serialize, Serializer},
};
use zeroize::{Zeroize, ZeroizeOnDrop};

const MIN_CAPACITY: usize = 8;

/// A growable byte buffer whose storage comes exclusively from a [`SecureAllocator`].
///
/// With the default [`LockedAllocator`] the whole capacity stays pinned for as long as the buffer owns it. Every
/// region the buffer gives up is zeroed before it is handed back:
/// * on drop,
/// * when growing, after the content has been copied to the new region,
/// * on [`SecureBytes::shrink_to_fit`],
/// * on [`SecureBytes::take`], which leaves an empty buffer behind.
///
/// Shortening the buffer without reallocating ([`SecureBytes::truncate`], [`SecureBytes::clear`],
/// [`SecureBytes::assign`]) zeroes the bytes that fall out of the buffer.
///
/// A failed allocation leaves the buffer untouched. The `try_*` methods report it, the others log it and panic.
pub struct SecureBytes<A: SecureAllocator<u8> = LockedAllocator<u8>> {
    ptr: NonNull<u8>,
    len: usize,
    cap: usize,
    alloc: A,
}

/// Bytes that are cleared on release but not pinned, for short-lived copies of sensitive data.
pub type ZeroingBytes = SecureBytes<ZeroingAllocator<u8>>;

/// A region on its way back to the allocator. Dropping it zeroes and releases the storage.
struct Region<'a, A: SecureAllocator<u8>> {
    ptr: NonNull<u8>,
    cap: usize,
    alloc: &'a A,
}

impl<A: SecureAllocator<u8>> Drop for Region<'_, A> {
    fn drop(&mut self) {
        if self.cap != 0 {
            unsafe { self.alloc.deallocate(self.ptr.as_ptr(), self.cap) }
        }
    }
}

#[cold]
fn capacity_failure(e: MemoryError) -> ! {
    error!("secure buffer could not be allocated: {}", e);
    panic!("secure buffer could not be allocated: {}", e)
}

/// Compares in time depending only on the lengths.
fn const_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    lhs.len() == rhs.len() && lhs.iter().zip(rhs).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

impl<A: SecureAllocator<u8>> SecureBytes<A> {
    pub fn new() -> Self {
        Self::new_in(A::default())
    }

    pub fn new_in(alloc: A) -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            cap: 0,
            alloc,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::try_with_capacity(capacity).unwrap_or_else(|e| capacity_failure(e))
    }

    pub fn try_with_capacity(capacity: usize) -> Result<Self, MemoryError> {
        Self::try_with_capacity_in(capacity, A::default())
    }

    pub fn try_with_capacity_in(capacity: usize, alloc: A) -> Result<Self, MemoryError> {
        let ptr = alloc.allocate(capacity)?;

        Ok(Self {
            ptr,
            len: 0,
            cap: capacity,
            alloc,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::try_from_slice(bytes).unwrap_or_else(|e| capacity_failure(e))
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, MemoryError> {
        Self::try_from_slice_in(bytes, A::default())
    }

    pub fn try_from_slice_in(bytes: &[u8], alloc: A) -> Result<Self, MemoryError> {
        let mut this = Self::try_with_capacity_in(bytes.len(), alloc)?;
        unsafe { this.append_unchecked(bytes) };
        Ok(this)
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Raw access for byte-oriented interfaces. The pointer is only valid while the buffer is alive and not
    /// modified.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub fn reserve(&mut self, additional: usize) {
        self.try_reserve(additional).unwrap_or_else(|e| capacity_failure(e))
    }

    /// Makes room for at least `additional` more bytes, doubling the capacity when it grows.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), MemoryError> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(MemoryError::CapacityOverflow)?;

        if required <= self.cap {
            return Ok(());
        }

        let capacity = cmp::max(cmp::max(self.cap.saturating_mul(2), required), MIN_CAPACITY);
        self.reallocate(capacity)
    }

    pub fn push(&mut self, byte: u8) {
        self.try_push(byte).unwrap_or_else(|e| capacity_failure(e))
    }

    pub fn try_push(&mut self, byte: u8) -> Result<(), MemoryError> {
        if self.len == self.cap {
            self.try_reserve(1)?;
        }

        unsafe { self.ptr.as_ptr().add(self.len).write(byte) };
        self.len += 1;

        Ok(())
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.try_extend_from_slice(bytes).unwrap_or_else(|e| capacity_failure(e))
    }

    pub fn try_extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), MemoryError> {
        self.try_reserve(bytes.len())?;
        unsafe { self.append_unchecked(bytes) };
        Ok(())
    }

    /// Replaces the content with `bytes`.
    pub fn assign(&mut self, bytes: &[u8]) {
        self.try_assign(bytes).unwrap_or_else(|e| capacity_failure(e))
    }

    pub fn try_assign(&mut self, bytes: &[u8]) -> Result<(), MemoryError> {
        if bytes.len() > self.cap {
            // the replacement is complete before the old region goes away
            *self = Self::try_from_slice_in(bytes, self.alloc.clone())?;
            return Ok(());
        }

        self.truncate(bytes.len());
        let len = self.len;
        self.as_mut_slice().copy_from_slice(&bytes[..len]);
        unsafe { self.append_unchecked(&bytes[len..]) };

        Ok(())
    }

    /// Shortens the buffer to `len` bytes, zeroing what is cut off. The capacity is kept.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }

        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr().add(len), self.len - len) }.zeroize();
        self.len = len;
    }

    /// Zeroes the content and sets the length to 0. The capacity is kept.
    pub fn clear(&mut self) {
        self.truncate(0)
    }

    pub fn resize(&mut self, len: usize, value: u8) {
        self.try_resize(len, value).unwrap_or_else(|e| capacity_failure(e))
    }

    pub fn try_resize(&mut self, len: usize, value: u8) -> Result<(), MemoryError> {
        if len <= self.len {
            self.truncate(len);
            return Ok(());
        }

        let extra = len - self.len;
        self.try_reserve(extra)?;

        unsafe { ptr::write_bytes(self.ptr.as_ptr().add(self.len), value, extra) };
        self.len = len;

        Ok(())
    }

    pub fn shrink_to_fit(&mut self) {
        self.try_shrink_to_fit().unwrap_or_else(|e| capacity_failure(e))
    }

    /// Moves the content into a region of exactly `len` bytes. An empty buffer gives up its storage entirely.
    pub fn try_shrink_to_fit(&mut self) -> Result<(), MemoryError> {
        if self.cap > self.len {
            self.reallocate(self.len)?;
        }
        Ok(())
    }

    /// Moves the content out, leaving an empty buffer that owns no storage behind.
    pub fn take(&mut self) -> Self {
        let empty = Self::new_in(self.alloc.clone());
        mem::replace(self, empty)
    }

    /// Copies the content into a fresh region of `capacity` bytes, then zeroes and releases the current one.
    ///
    /// If the new region cannot be obtained the buffer keeps its current region and content.
    fn reallocate(&mut self, capacity: usize) -> Result<(), MemoryError> {
        debug_assert!(capacity >= self.len);

        let fresh = self.alloc.allocate(capacity)?;

        let old = Region {
            ptr: self.ptr,
            cap: self.cap,
            alloc: &self.alloc,
        };

        unsafe { ptr::copy_nonoverlapping(old.ptr.as_ptr(), fresh.as_ptr(), self.len) };

        debug!("secure buffer moved from {} to {} bytes of capacity", old.cap, capacity);

        self.ptr = fresh;
        self.cap = capacity;

        drop(old);

        Ok(())
    }

    /// # Safety
    /// The spare capacity must hold at least `bytes.len()` bytes.
    unsafe fn append_unchecked(&mut self, bytes: &[u8]) {
        debug_assert!(self.cap - self.len >= bytes.len());

        ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(self.len), bytes.len());
        self.len += bytes.len();
    }
}

impl<A: SecureAllocator<u8>> Drop for SecureBytes<A> {
    fn drop(&mut self) {
        drop(Region {
            ptr: self.ptr,
            cap: self.cap,
            alloc: &self.alloc,
        });
    }
}

impl<A: SecureAllocator<u8>> Zeroize for SecureBytes<A> {
    fn zeroize(&mut self) {
        self.clear()
    }
}

impl<A: SecureAllocator<u8>> ZeroizeOnDrop for SecureBytes<A> {}

impl<A: SecureAllocator<u8>> Default for SecureBytes<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: SecureAllocator<u8>> Clone for SecureBytes<A> {
    fn clone(&self) -> Self {
        Self::try_from_slice_in(self.as_slice(), self.alloc.clone()).unwrap_or_else(|e| capacity_failure(e))
    }
}

impl<A: SecureAllocator<u8>> Deref for SecureBytes<A> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<A: SecureAllocator<u8>> DerefMut for SecureBytes<A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<A: SecureAllocator<u8>> AsRef<[u8]> for SecureBytes<A> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<A: SecureAllocator<u8>> AsMut<[u8]> for SecureBytes<A> {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl<A: SecureAllocator<u8>> Borrow<[u8]> for SecureBytes<A> {
    fn borrow(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<A: SecureAllocator<u8>> From<&[u8]> for SecureBytes<A> {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}

impl<A: SecureAllocator<u8>, const N: usize> From<&[u8; N]> for SecureBytes<A> {
    fn from(bytes: &[u8; N]) -> Self {
        Self::from_slice(bytes)
    }
}

impl<A: SecureAllocator<u8>> From<&str> for SecureBytes<A> {
    fn from(s: &str) -> Self {
        Self::from_slice(s.as_bytes())
    }
}

impl<A: SecureAllocator<u8>> Extend<u8> for SecureBytes<A> {
    fn extend<I: IntoIterator<Item = u8>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for byte in iter {
            self.push(byte);
        }
    }
}

impl<'a, A: SecureAllocator<u8>> Extend<&'a u8> for SecureBytes<A> {
    fn extend<I: IntoIterator<Item = &'a u8>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied())
    }
}

impl<A: SecureAllocator<u8>> io::Write for SecureBytes<A> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.try_extend_from_slice(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<A: SecureAllocator<u8>, B: SecureAllocator<u8>> PartialEq<SecureBytes<B>> for SecureBytes<A> {
    fn eq(&self, other: &SecureBytes<B>) -> bool {
        const_eq(self.as_slice(), other.as_slice())
    }
}

impl<A: SecureAllocator<u8>> Eq for SecureBytes<A> {}

impl<A: SecureAllocator<u8>> PartialEq<[u8]> for SecureBytes<A> {
    fn eq(&self, other: &[u8]) -> bool {
        const_eq(self.as_slice(), other)
    }
}

impl<A: SecureAllocator<u8>> PartialEq<&[u8]> for SecureBytes<A> {
    fn eq(&self, other: &&[u8]) -> bool {
        const_eq(self.as_slice(), other)
    }
}

impl<A: SecureAllocator<u8>, const N: usize> PartialEq<[u8; N]> for SecureBytes<A> {
    fn eq(&self, other: &[u8; N]) -> bool {
        const_eq(self.as_slice(), other)
    }
}

impl<A: SecureAllocator<u8>> PartialEq<str> for SecureBytes<A> {
    fn eq(&self, other: &str) -> bool {
        const_eq(self.as_slice(), other.as_bytes())
    }
}

impl<A: SecureAllocator<u8>> PartialEq<&str> for SecureBytes<A> {
    fn eq(&self, other: &&str) -> bool {
        const_eq(self.as_slice(), other.as_bytes())
    }
}

impl<A: SecureAllocator<u8>, B: SecureAllocator<u8>> PartialOrd<SecureBytes<B>> for SecureBytes<A> {
    fn partial_cmp(&self, other: &SecureBytes<B>) -> Option<Ordering> {
        Some(self.as_slice().cmp(other.as_slice()))
    }
}

impl<A: SecureAllocator<u8>> Ord for SecureBytes<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_slice().cmp(other.as_slice())
    }
}

impl<A: SecureAllocator<u8>> Hash for SecureBytes<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state)
    }
}

impl<A: SecureAllocator<u8>> Debug for SecureBytes<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{ size: {}, {} }}", self.len, DEBUG_MSG)
    }
}

unsafe impl<A: SecureAllocator<u8>> Send for SecureBytes<A> {}
unsafe impl<A: SecureAllocator<u8>> Sync for SecureBytes<A> {}

impl<A: SecureAllocator<u8>> Serialize for SecureBytes<A> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(self.as_slice())
    }
}

struct SecureBytesVisitor<A> {
    marker: PhantomData<fn() -> A>,
}

impl<'de, A: SecureAllocator<u8>> Visitor<'de> for SecureBytesVisitor<A> {
    type Value = SecureBytes<A>;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str("a byte sequence")
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        SecureBytes::<A>::try_from_slice(v).map_err(E::custom)
    }

    fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
    where
        S: SeqAccess<'de>,
    {
        // the hint comes from the input, do not trust it with a large allocation
        let hint = cmp::min(seq.size_hint().unwrap_or(0), 4096);
        let mut bytes = SecureBytes::<A>::try_with_capacity(hint).map_err(de::Error::custom)?;

        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.try_push(byte).map_err(de::Error::custom)?;
        }

        Ok(bytes)
    }
}

impl<'de, A: SecureAllocator<u8>> Deserialize<'de> for SecureBytes<A> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_bytes(SecureBytesVisitor { marker: PhantomData })
    }
}
