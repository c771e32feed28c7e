//! Cluster membership bookkeeping.
//!
//! Tracks the static cluster roster (node ids and datagram addresses) plus the
//! single piece of dynamic state consensus produces: which node is currently
//! believed to be leader, and at which term. Membership is the authoritative
//! address book for outbound replication and vote traffic.

mod cluster_membership;
pub use cluster_membership::*;

#[cfg(test)]
mod cluster_membership_test;

use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;

/// Static description of one cluster member.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NodeMeta {
    pub id: u32,
    pub address: SocketAddr,
}

/// Leadership observation shared with subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderInfo {
    pub leader_id: u32,
    pub term: u64,
}
