// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Secure memory for key material.
//!
//! Two allocation strategies are provided:
//!
//! - [`LockedAllocator`] pins every page it hands out so the contents never reach swap, and wipes the region before
//!   unpinning and releasing it.
//! - [`ZeroingAllocator`] only wipes on release. It is meant for short-lived copies where spending the process' pin
//!   quota is not justified.
//!
//! [`SecureBytes`] and [`SecureString`] are growable containers parameterized over either strategy. Every region they
//! give up, whether on drop, growth, shrink or [`SecureBytes::take`], goes back through the allocator and is zeroed on
//! the way.

#[macro_use]
extern crate lazy_static;

pub mod allocator;
pub mod bytes;
pub mod locker;
pub mod string;

pub use allocator::{LockedAllocator, SecureAllocator, ZeroingAllocator};
pub use bytes::{SecureBytes, ZeroingBytes};
pub use locker::{page_size, PageExtent, PageLocker, SystemLocker};
pub use string::SecureString;

pub use thiserror::Error as DeriveError;

/// The secure containers of this crate print this instead of their content.
pub const DEBUG_MSG: &str = "hidden";

/// The different types of Error that may be encountered while using this crate
#[derive(Debug, DeriveError, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("out of memory: failed to allocate {size} bytes")]
    OutOfMemory { size: usize },

    #[error("failed to lock {size} bytes into memory ({reason})")]
    LockFailed { size: usize, reason: String },

    #[error("failed to unlock {size} bytes ({reason})")]
    UnlockFailed { size: usize, reason: String },

    #[error("requested capacity exceeds the addressable range")]
    CapacityOverflow,
}
