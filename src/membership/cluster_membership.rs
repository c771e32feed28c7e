use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tracing::trace;

use super::LeaderInfo;
use super::NodeMeta;
use crate::utils::cluster::is_majority;

/// Authoritative view of the cluster roster and the currently observed leader.
///
/// The roster is fixed at startup. Leader state is updated by the consensus
/// core whenever a node wins an election or a valid AppendEntries arrives from
/// a new leader, and read concurrently by client-facing code.
pub struct ClusterMembership {
    node_id: u32,
    members: DashMap<u32, NodeMeta>,
    leader: ArcSwapOption<LeaderInfo>,
}

impl Debug for ClusterMembership {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ClusterMembership")
            .field("node_id", &self.node_id)
            .finish()
    }
}

impl ClusterMembership {
    pub fn new(
        node_id: u32,
        initial_cluster: Vec<NodeMeta>,
    ) -> Self {
        let members = DashMap::new();
        for node in initial_cluster {
            members.insert(node.id, node);
        }
        Self {
            node_id,
            members,
            leader: ArcSwapOption::const_empty(),
        }
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// All members (including itself)
    pub fn members(&self) -> Vec<NodeMeta> {
        self.members.iter().map(|entry| entry.value().clone()).collect()
    }

    /// All non-self node ids
    pub fn peer_ids(&self) -> Vec<u32> {
        self.members
            .iter()
            .filter(|entry| entry.id != self.node_id)
            .map(|entry| entry.id)
            .collect()
    }

    /// All non-self nodes
    pub fn peers(&self) -> Vec<NodeMeta> {
        self.members
            .iter()
            .filter(|entry| entry.id != self.node_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn peer_address(
        &self,
        node_id: u32,
    ) -> Option<SocketAddr> {
        self.members.get(&node_id).map(|entry| entry.address)
    }

    pub fn cluster_size(&self) -> usize {
        self.members.len()
    }

    /// True if `count` nodes form a strict majority of the cluster
    pub fn is_cluster_majority(
        &self,
        count: usize,
    ) -> bool {
        is_majority(count, self.cluster_size())
    }

    /// Records `leader_id` as the leader observed for `term`.
    pub fn mark_leader(
        &self,
        leader_id: u32,
        term: u64,
    ) {
        trace!("mark {} as leader of term {}", leader_id, term);
        self.leader.store(Some(Arc::new(LeaderInfo { leader_id, term })));
    }

    /// Clears the leader observation, e.g. when an election starts.
    pub fn reset_leader(&self) {
        self.leader.store(None);
    }

    pub fn current_leader(&self) -> Option<LeaderInfo> {
        self.leader.load().as_deref().copied()
    }

    /// Address of the currently observed leader, if any.
    pub fn current_leader_address(&self) -> Option<SocketAddr> {
        self.current_leader().and_then(|info| self.peer_address(info.leader_id))
    }
}
