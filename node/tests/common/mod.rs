// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use node::{NodeStats, PeerTable};

use test_utils::fresh;

use std::sync::Arc;

/// Logging plus a peer table filled with stub peers.
pub struct TestingSetup {
    pub peers: PeerTable,
}

impl TestingSetup {
    pub fn new() -> Self {
        test_utils::init_logger();

        Self { peers: PeerTable::new() }
    }

    pub fn with_random_peers(n: usize) -> Self {
        let setup = Self::new();
        for _ in 0..n {
            setup.add(random_peer());
        }
        setup
    }

    pub fn add(&self, stats: NodeStats) {
        self.peers.add(Arc::new(stats)).unwrap();
    }
}

pub fn random_peer() -> NodeStats {
    let connected = 1_600_000_000 + (rand_secs() % 10_000_000);

    NodeStats {
        addr_name: fresh::socket_addr().to_string(),
        services: fresh::usize(16) as u64,
        last_send: connected + rand_secs() % 600,
        last_recv: connected + rand_secs() % 600,
        time_connected: connected,
        version: 70002,
        sub_ver: fresh::user_agent(),
        inbound: fresh::coinflip(),
        release_time: 0,
        starting_height: fresh::usize(4_000_000) as i32,
        misbehavior: fresh::usize(100) as i32,
    }
}

fn rand_secs() -> i64 {
    fresh::usize(1 << 20) as i64
}
