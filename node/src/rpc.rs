// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Read-only RPC calls over the peer table.
//!
//! Both calls take no parameters. Passing any, or asking for help, fails with [`RpcError::BadArguments`] whose
//! message is the call's help text.

use crate::net::{NetError, NodeStats, PeerTable};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error as DeriveError;

const GETCONNECTIONCOUNT_HELP: &str = "getconnectioncount\nReturns the number of connections to other nodes.";
const GETPEERINFO_HELP: &str = "getpeerinfo\nReturns data about each connected network node.";

#[derive(Debug, DeriveError)]
pub enum RpcError {
    #[error("{usage}")]
    BadArguments { usage: &'static str },

    #[error("acquiring the peer table lock failed")]
    LockAcquireFailed,

    #[error("encoding the reply failed ({0})")]
    Encode(#[from] serde_json::Error),
}

impl From<NetError> for RpcError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::LockAcquireFailed => RpcError::LockAcquireFailed,
        }
    }
}

impl RpcError {
    /// The generic JSON-RPC error code the node reports usage and runtime failures with.
    pub const MISC_ERROR: i64 = -1;

    pub fn code(&self) -> i64 {
        Self::MISC_ERROR
    }

    pub fn to_json(&self) -> Value {
        json!({
            "code": self.code(),
            "message": self.to_string(),
        })
    }
}

/// One entry of the `getpeerinfo` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub addr: String,
    pub services: String,
    pub lastsend: i64,
    pub lastrecv: i64,
    pub conntime: i64,
    pub version: i32,
    pub subver: String,
    pub inbound: bool,
    pub releasetime: i64,
    pub startingheight: i32,
    pub banscore: i32,
}

impl From<&NodeStats> for PeerInfo {
    fn from(stats: &NodeStats) -> Self {
        Self {
            addr: stats.addr_name.clone(),
            services: format!("{:08x}", stats.services),
            lastsend: stats.last_send,
            lastrecv: stats.last_recv,
            conntime: stats.time_connected,
            version: stats.version,
            subver: stats.sub_ver.clone(),
            inbound: stats.inbound,
            releasetime: stats.release_time,
            startingheight: stats.starting_height,
            banscore: stats.misbehavior,
        }
    }
}

fn no_arguments(params: &[Value], help: bool, usage: &'static str) -> Result<(), RpcError> {
    if help || !params.is_empty() {
        return Err(RpcError::BadArguments { usage });
    }
    Ok(())
}

pub fn getconnectioncount(params: &[Value], help: bool, peers: &PeerTable) -> Result<Value, RpcError> {
    no_arguments(params, help, GETCONNECTIONCOUNT_HELP)?;

    Ok(Value::from(peers.connection_count()?))
}

pub fn getpeerinfo(params: &[Value], help: bool, peers: &PeerTable) -> Result<Value, RpcError> {
    no_arguments(params, help, GETPEERINFO_HELP)?;

    let stats = peers.snapshot()?;
    let info: Vec<PeerInfo> = stats.iter().map(PeerInfo::from).collect();

    Ok(serde_json::to_value(info)?)
}
