mod replication_handler;
pub use replication_handler::*;


// ------------------------------------------------------------------------------
// Trait Definition
#[cfg(test)]
use mockall::automock;
use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::alias::ROF;
use crate::membership::ClusterMembership;
use crate::network::Transport;
use crate::protocol::AppendEntriesRequest;
use crate::Result;
use crate::TypeConfig;

/// What an incoming AppendEntries request did to the local log, plus the
/// state updates the caller still has to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResponseWithUpdates {
    pub success: bool,

    /// Highest log index confirmed equal to the leader's log. Only
    /// meaningful when `success` is true.
    pub last_matched_id: u64,

    /// New commit index to adopt, if the leader's commit index allows one.
    pub commit_index_update: Option<u64>,
}

#[cfg_attr(test, automock)]
pub trait ReplicationCore<T>: Send + Sync + 'static
where
    T: TypeConfig,
{
    /// Leader fan-out: one AppendEntries request per peer, built from that
    /// peer's next index. An empty entry list doubles as the heartbeat.
    ///
    /// Every send runs on its own task scoped to `tenure`; dropping the
    /// token silences a deposed leader without touching the tasks of its
    /// successor. Replies arrive later through the node's event queue.
    #[allow(clippy::too_many_arguments)]
    fn broadcast_append_entries(
        &self,
        current_term: u64,
        commit_index: u64,
        peer_next_indices: &HashMap<u32, u64>,
        raft_log: &Arc<ROF<T>>,
        membership: &Arc<ClusterMembership>,
        transport: &Arc<dyn Transport>,
        max_entries_per_append: u64,
        tenure: &CancellationToken,
    );

    /// Re-sends to a single peer, typically right after a rejection moved
    /// that peer's next index back.
    #[allow(clippy::too_many_arguments)]
    fn replicate_to_peer(
        &self,
        peer_id: u32,
        current_term: u64,
        commit_index: u64,
        next_index: u64,
        raft_log: &Arc<ROF<T>>,
        membership: &Arc<ClusterMembership>,
        transport: &Arc<dyn Transport>,
        max_entries_per_append: u64,
        tenure: &CancellationToken,
    );

    /// Applies an incoming AppendEntries request to the local log.
    ///
    /// The caller has already reconciled terms: a request from a stale
    /// term was rejected before this point and a higher term was adopted.
    /// This method only runs the log consistency check, merges the
    /// entries, and works out the follower commit index.
    fn handle_append_entries(
        &self,
        request: AppendEntriesRequest,
        commit_index: u64,
        raft_log: &Arc<ROF<T>>,
    ) -> Result<AppendResponseWithUpdates>;

    /// If leaderCommit > commitIndex, set
    /// commitIndex = min(leaderCommit, index of last new entry).
    fn if_update_commit_index_as_follower(
        my_commit_index: u64,
        last_new_entry_index: u64,
        leader_commit_index: u64,
    ) -> Option<u64>;
}
