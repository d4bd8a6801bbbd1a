// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

pub mod fresh;

/// Installs the test logger. Honors `RUST_LOG` and defaults to `info`; safe to call from every test.
pub fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter(None, log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .try_init();
}

/// Flips at least one byte of `bs`.
pub fn corrupt(bs: &mut [u8]) {
    if bs.is_empty() {
        return;
    }
    loop {
        let i = rand::random::<usize>() % bs.len();
        let b = bs[i];
        bs[i] = rand::random();
        if b != bs[i] && rand::random() {
            break;
        }
    }
}
