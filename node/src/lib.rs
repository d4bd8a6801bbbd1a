// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Node-side surfaces: the native dependency version gate checked at build time, the table of connected peers and
//! the read-only RPC calls that report on it.

pub mod compat;
pub mod net;
pub mod rpc;

pub use compat::{BuildConfig, CompatError};
pub use net::{NetError, NodeStats, Peer, PeerTable, SharedPeer};
pub use rpc::{getconnectioncount, getpeerinfo, PeerInfo, RpcError};
