// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{Release, StubBytes, StubLocker, StubString};

use log::*;
use quickcheck::{quickcheck, Arbitrary, Gen};

use runtime::{MemoryError, SecureBytes, SecureString, SystemLocker, ZeroingBytes};

use test_utils::fresh;

fn assert_single_pin(bytes: &StubBytes) {
    if bytes.capacity() == 0 {
        assert!(StubLocker::pinned().is_empty());
    } else {
        assert_eq!(StubLocker::pinned(), vec![(bytes.as_ptr() as usize, bytes.capacity())]);
    }
}

#[test]
fn test_released_region_is_zeroed() {
    test_utils::init_logger();
    StubLocker::reset();

    let s = StubString::from("secret");
    let addr = s.as_ptr() as usize;
    drop(s);

    assert_eq!(
        StubLocker::take_releases(),
        vec![Release {
            addr,
            len: 6,
            zeroed: true
        }]
    );
    assert!(StubLocker::pinned().is_empty());
}

#[test]
fn test_growth_releases_zeroed_regions() {
    test_utils::init_logger();
    StubLocker::reset();

    let mut bytes = StubBytes::new();
    for _ in 0..10_000 {
        bytes.push(b'x');
        assert_single_pin(&bytes);
    }

    let releases = StubLocker::take_releases();
    info!("{} regions released while growing", releases.len());

    assert!(!releases.is_empty());
    assert!(releases.iter().all(|r| r.zeroed));
    assert_eq!(bytes.len(), 10_000);
    assert!(bytes.iter().all(|b| *b == b'x'));
}

#[test]
fn test_failed_growth_keeps_region() {
    test_utils::init_logger();
    StubLocker::reset();

    let mut bytes = StubBytes::from_slice(b"secret");
    let ptr = bytes.as_ptr();
    let capacity = bytes.capacity();

    StubLocker::fail_next();

    assert!(matches!(bytes.try_push(b'!'), Err(MemoryError::LockFailed { .. })));
    assert_eq!(bytes.len(), 6);
    assert_eq!(bytes.as_ptr(), ptr);
    assert_eq!(bytes.capacity(), capacity);
    assert!(StubLocker::is_pinned(ptr, capacity));
    assert_eq!(bytes, "secret");

    // the rejected region never reached the locker's release path
    assert!(StubLocker::take_releases().is_empty());

    bytes.try_push(b'!').unwrap();
    assert_eq!(bytes, "secret!");
    assert_single_pin(&bytes);
}

#[test]
fn test_failed_construction() {
    StubLocker::reset();
    StubLocker::fail_next();

    assert!(StubBytes::try_from_slice(b"seed").is_err());
    assert!(StubLocker::pinned().is_empty());
}

#[test]
#[should_panic]
fn test_failed_push_panics() {
    StubLocker::reset();

    let mut bytes = StubBytes::from_slice(b"full");
    StubLocker::fail_next();
    bytes.push(0);
}

#[test]
fn test_take_leaves_source_unpinned() {
    StubLocker::reset();

    let mut source = StubBytes::from_slice(b"moved");
    let target = source.take();

    assert!(source.is_empty());
    assert_eq!(source.capacity(), 0);
    assert_single_pin(&target);
    assert_eq!(target, "moved");

    drop(source);
    assert!(StubLocker::take_releases().is_empty());
}

#[test]
fn test_zero_length_never_pins() {
    StubLocker::reset();

    let mut bytes = StubBytes::with_capacity(0);
    bytes.extend_from_slice(&[]);
    bytes.assign(&[]);
    drop(bytes);

    let _ = StubString::from("");

    assert!(StubLocker::pinned().is_empty());
    assert!(StubLocker::take_releases().is_empty());
}

#[test]
fn test_shrink_and_assign_release_old_region() {
    StubLocker::reset();

    let mut bytes = StubBytes::with_capacity(128);
    bytes.extend_from_slice(b"short");

    bytes.shrink_to_fit();
    assert_single_pin(&bytes);

    bytes.assign(b"a longer secret than before");
    assert_single_pin(&bytes);

    let releases = StubLocker::take_releases();
    assert_eq!(releases.iter().map(|r| r.len).collect::<Vec<_>>(), vec![128, 5]);
    assert!(releases.iter().all(|r| r.zeroed));
}

#[test]
fn test_system_locked_roundtrip() {
    test_utils::init_logger();

    for _ in 0..16 {
        let data = fresh::bytestring();
        let bytes = SecureBytes::<runtime::LockedAllocator<u8>>::from_slice(&data);

        assert_eq!(bytes, data[..]);
        if !bytes.is_empty() {
            assert!(SystemLocker::is_pinned(bytes.as_ptr()));
        }

        let mut tampered = data.clone();
        test_utils::corrupt(&mut tampered);
        if !data.is_empty() {
            assert_ne!(bytes, tampered[..]);
        }
    }
}

#[test]
fn test_passphrase_strings() {
    for _ in 0..16 {
        let phrase = fresh::passphrase();
        let s = SecureString::<runtime::LockedAllocator<u8>>::from(phrase.as_str());
        let zs = SecureString::<runtime::ZeroingAllocator<u8>>::from(phrase.as_str());

        assert_eq!(s, phrase);
        assert_eq!(s, zs);
    }

    let text = fresh::string();
    let s = SecureString::<runtime::ZeroingAllocator<u8>>::from(text.as_str());

    assert_eq!(s.len(), text.len());
    assert_eq!(s, text);
}

#[test]
fn test_zeroing_bytes() {
    let data = fresh::non_empty_bytestring();
    let mut bytes = ZeroingBytes::from_slice(&data);

    bytes.truncate(data.len() / 2);

    assert_eq!(bytes, data[..data.len() / 2]);
}

#[derive(Debug, Clone)]
enum Op {
    Push(u8),
    Extend(Vec<u8>),
    Assign(Vec<u8>),
    Truncate(usize),
    Resize(usize, u8),
    Reserve(usize),
    Clear,
    Shrink,
}

impl Arbitrary for Op {
    fn arbitrary(g: &mut Gen) -> Self {
        match u8::arbitrary(g) % 8 {
            0 => Op::Push(u8::arbitrary(g)),
            1 => Op::Extend(Vec::arbitrary(g)),
            2 => Op::Assign(Vec::arbitrary(g)),
            3 => Op::Truncate(usize::arbitrary(g) % 256),
            4 => Op::Resize(usize::arbitrary(g) % 256, u8::arbitrary(g)),
            5 => Op::Reserve(usize::arbitrary(g) % 256),
            6 => Op::Clear,
            _ => Op::Shrink,
        }
    }
}

fn apply(op: &Op, bytes: &mut StubBytes, model: &mut Vec<u8>) {
    match op {
        Op::Push(b) => {
            bytes.push(*b);
            model.push(*b);
        }
        Op::Extend(bs) => {
            bytes.extend_from_slice(bs);
            model.extend_from_slice(bs);
        }
        Op::Assign(bs) => {
            bytes.assign(bs);
            *model = bs.clone();
        }
        Op::Truncate(n) => {
            bytes.truncate(*n);
            model.truncate(*n);
        }
        Op::Resize(n, b) => {
            bytes.resize(*n, *b);
            model.resize(*n, *b);
        }
        Op::Reserve(n) => bytes.reserve(*n),
        Op::Clear => {
            bytes.clear();
            model.clear();
        }
        Op::Shrink => bytes.shrink_to_fit(),
    }
}

quickcheck! {
    fn prop_behaves_like_vec_and_pins_one_region(ops: Vec<Op>) -> bool {
        StubLocker::reset();

        let mut bytes = StubBytes::new();
        let mut model = Vec::new();

        for op in &ops {
            apply(op, &mut bytes, &mut model);

            let pinned = if bytes.capacity() == 0 {
                StubLocker::pinned().is_empty()
            } else {
                StubLocker::pinned() == vec![(bytes.as_ptr() as usize, bytes.capacity())]
            };

            if !pinned || bytes != model[..] || bytes.capacity() < bytes.len() {
                return false;
            }
        }

        drop(bytes);

        StubLocker::pinned().is_empty() && StubLocker::take_releases().iter().all(|r| r.zeroed)
    }
}
