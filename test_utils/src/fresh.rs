// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use rand::{distributions::Alphanumeric, Rng};

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub fn bytestring() -> Vec<u8> {
    let s = if rand::random::<u8>() % 4 == 0 {
        0
    } else {
        rand::random::<usize>() % 4096
    };

    let mut bs = Vec::with_capacity(s);
    for _ in 0..s {
        bs.push(rand::random());
    }
    bs
}

pub fn non_empty_bytestring() -> Vec<u8> {
    let s = (rand::random::<usize>() % 4096) + 1;
    let mut bs = Vec::with_capacity(s);
    for _ in 0..s {
        bs.push(rand::random());
    }
    bs
}

pub fn string() -> String {
    let l = if rand::random::<u8>() % 4 == 0 {
        0
    } else {
        rand::random::<usize>() % 4096
    };

    let mut s = String::with_capacity(l);
    for _ in 0..l {
        s.push(rand::random())
    }
    s
}

/// A printable passphrase of 8 to 64 characters.
pub fn passphrase() -> String {
    let l = 8 + rand::random::<usize>() % 57;
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(l)
        .map(char::from)
        .collect()
}

pub fn coinflip() -> bool {
    rand::random()
}

pub fn usize(n: usize) -> usize {
    if rand::random::<u8>() % 4 == 0 {
        0
    } else {
        rand::random::<usize>() % n
    }
}

pub fn socket_addr() -> SocketAddr {
    let ip = Ipv4Addr::from(rand::random::<u32>());
    let port = rand::thread_rng().gen_range(1024..=u16::MAX);
    SocketAddr::V4(SocketAddrV4::new(ip, port))
}

/// A subversion string the way nodes announce themselves, e.g. `/Corgi:0.14.2/`.
pub fn user_agent() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "/Corgi:{}.{}.{}/",
        rng.gen_range(0..2),
        rng.gen_range(0..30),
        rng.gen_range(0..10)
    )
}
