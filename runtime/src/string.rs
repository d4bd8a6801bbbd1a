// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::{
    allocator::{LockedAllocator, SecureAllocator},
    bytes::SecureBytes,
    MemoryError, DEBUG_MSG,
};

use core::{
    cmp::Ordering,
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::Deref,
    str::{self, Utf8Error},
};

use serde::{
    de::{self, Deserialize, Deserializer, Visitor},
    ser::{Serialize, Serializer},
};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// UTF-8 text kept in a [`SecureBytes`] buffer, for passphrases and mnemonics.
pub struct SecureString<A: SecureAllocator<u8> = LockedAllocator<u8>> {
    bytes: SecureBytes<A>,
}

impl<A: SecureAllocator<u8>> SecureString<A> {
    pub fn new() -> Self {
        Self {
            bytes: SecureBytes::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: SecureBytes::with_capacity(capacity),
        }
    }

    pub fn try_from_str(s: &str) -> Result<Self, MemoryError> {
        Ok(Self {
            bytes: SecureBytes::try_from_slice(s.as_bytes())?,
        })
    }

    pub fn push(&mut self, c: char) {
        self.push_str(c.encode_utf8(&mut [0; 4]))
    }

    pub fn push_str(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes())
    }

    pub fn try_push_str(&mut self, s: &str) -> Result<(), MemoryError> {
        self.bytes.try_extend_from_slice(s.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        // only ever filled from `&str` or validated bytes
        unsafe { str::from_utf8_unchecked(self.bytes.as_slice()) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    pub fn clear(&mut self) {
        self.bytes.clear()
    }

    /// Shortens the string to `len` bytes, zeroing the rest.
    ///
    /// # Panics
    /// If `len` does not lie on a char boundary.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            assert!(self.as_str().is_char_boundary(len), "truncate inside a character");
            self.bytes.truncate(len)
        }
    }

    pub fn into_bytes(self) -> SecureBytes<A> {
        self.bytes
    }

    pub fn take(&mut self) -> Self {
        Self {
            bytes: self.bytes.take(),
        }
    }
}

impl<A: SecureAllocator<u8>> TryFrom<SecureBytes<A>> for SecureString<A> {
    type Error = Utf8Error;

    fn try_from(bytes: SecureBytes<A>) -> Result<Self, Self::Error> {
        str::from_utf8(bytes.as_slice())?;
        Ok(Self { bytes })
    }
}

impl<A: SecureAllocator<u8>> From<&str> for SecureString<A> {
    fn from(s: &str) -> Self {
        Self {
            bytes: SecureBytes::from_slice(s.as_bytes()),
        }
    }
}

impl<A: SecureAllocator<u8>> Deref for SecureString<A> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl<A: SecureAllocator<u8>> AsRef<str> for SecureString<A> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl<A: SecureAllocator<u8>> AsRef<[u8]> for SecureString<A> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<A: SecureAllocator<u8>> fmt::Write for SecureString<A> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.try_push_str(s).map_err(|_| fmt::Error)
    }
}

impl<A: SecureAllocator<u8>> Default for SecureString<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: SecureAllocator<u8>> Clone for SecureString<A> {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
        }
    }
}

impl<A: SecureAllocator<u8>> Zeroize for SecureString<A> {
    fn zeroize(&mut self) {
        self.bytes.zeroize()
    }
}

impl<A: SecureAllocator<u8>> ZeroizeOnDrop for SecureString<A> {}

impl<A: SecureAllocator<u8>, B: SecureAllocator<u8>> PartialEq<SecureString<B>> for SecureString<A> {
    fn eq(&self, other: &SecureString<B>) -> bool {
        self.bytes == other.bytes
    }
}

impl<A: SecureAllocator<u8>> Eq for SecureString<A> {}

impl<A: SecureAllocator<u8>> PartialEq<str> for SecureString<A> {
    fn eq(&self, other: &str) -> bool {
        self.bytes == *other
    }
}

impl<A: SecureAllocator<u8>> PartialEq<&str> for SecureString<A> {
    fn eq(&self, other: &&str) -> bool {
        self.bytes == **other
    }
}

impl<A: SecureAllocator<u8>> PartialEq<String> for SecureString<A> {
    fn eq(&self, other: &String) -> bool {
        self.bytes == *other.as_str()
    }
}

impl<A: SecureAllocator<u8>, B: SecureAllocator<u8>> PartialOrd<SecureString<B>> for SecureString<A> {
    fn partial_cmp(&self, other: &SecureString<B>) -> Option<Ordering> {
        Some(self.as_str().cmp(other.as_str()))
    }
}

impl<A: SecureAllocator<u8>> Ord for SecureString<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl<A: SecureAllocator<u8>> Hash for SecureString<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

impl<A: SecureAllocator<u8>> Debug for SecureString<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{ size: {}, {} }}", self.len(), DEBUG_MSG)
    }
}

impl<A: SecureAllocator<u8>> Serialize for SecureString<A> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

struct SecureStringVisitor<A> {
    marker: PhantomData<fn() -> A>,
}

impl<'de, A: SecureAllocator<u8>> Visitor<'de> for SecureStringVisitor<A> {
    type Value = SecureString<A>;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str("a string")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        SecureString::<A>::try_from_str(v).map_err(E::custom)
    }
}

impl<'de, A: SecureAllocator<u8>> Deserialize<'de> for SecureString<A> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(SecureStringVisitor { marker: PhantomData })
    }
}
