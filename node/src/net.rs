// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use log::debug;
use thiserror::Error as DeriveError;

use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, DeriveError, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("acquiring the peer table lock failed")]
    LockAcquireFailed,
}

impl<T> From<PoisonError<T>> for NetError {
    fn from(_: PoisonError<T>) -> Self {
        NetError::LockAcquireFailed
    }
}

/// Statistics of one connection, copied out of the live peer.
///
/// Times are seconds since the epoch, a `release_time` of 0 means no disconnect is scheduled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub addr_name: String,
    pub services: u64,
    pub last_send: i64,
    pub last_recv: i64,
    pub time_connected: i64,
    pub version: i32,
    pub sub_ver: String,
    pub inbound: bool,
    pub release_time: i64,
    pub starting_height: i32,
    pub misbehavior: i32,
}

/// A connected node as seen by the peer table.
pub trait Peer {
    fn copy_stats(&self) -> NodeStats;
}

impl Peer for NodeStats {
    fn copy_stats(&self) -> NodeStats {
        self.clone()
    }
}

pub type SharedPeer = Arc<dyn Peer + Send + Sync>;

/// The set of connected peers, shared between the network threads and the RPC handlers.
#[derive(Default)]
pub struct PeerTable {
    peers: RwLock<Vec<SharedPeer>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, peer: SharedPeer) -> Result<(), NetError> {
        let mut peers = self.peers.write()?;
        peers.push(peer);

        debug!("peer added, {} connected", peers.len());

        Ok(())
    }

    /// Drops every peer connected under `addr`. Returns whether any was removed.
    pub fn remove(&self, addr: &str) -> Result<bool, NetError> {
        let mut peers = self.peers.write()?;
        let before = peers.len();
        peers.retain(|peer| peer.copy_stats().addr_name != addr);

        let removed = peers.len() != before;
        if removed {
            debug!("peer {} removed, {} connected", addr, peers.len());
        }

        Ok(removed)
    }

    pub fn connection_count(&self) -> Result<usize, NetError> {
        Ok(self.peers.read()?.len())
    }

    /// Copies the statistics of every peer under a shared lease. The lease is released before returning.
    pub fn snapshot(&self) -> Result<Vec<NodeStats>, NetError> {
        let peers = self.peers.read()?;
        Ok(peers.iter().map(|peer| peer.copy_stats()).collect())
    }
}
