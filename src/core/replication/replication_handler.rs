use std::cmp;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::AppendResponseWithUpdates;
use super::ReplicationCore;
use crate::alias::ROF;
use crate::membership::ClusterMembership;
use crate::network::Transport;
use crate::protocol::AppendEntriesRequest;
use crate::protocol::RaftMessage;
use crate::storage::RaftLog;
use crate::Result;
use crate::TypeConfig;

#[derive(Clone)]
pub struct ReplicationHandler<T>
where T: TypeConfig
{
    pub my_id: u32,

    _phantom: PhantomData<T>,
}

impl<T> ReplicationCore<T> for ReplicationHandler<T>
where T: TypeConfig
{
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
    ) {
        trace!("[L-{}] broadcast_append_entries, term={}", self.my_id, current_term);

        for (&peer_id, &next_index) in peer_next_indices {
            self.replicate_to_peer(
                peer_id,
                current_term,
                commit_index,
                next_index,
                raft_log,
                membership,
                transport,
                max_entries_per_append,
                tenure,
            );
        }
    }

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
    ) {
        let Some(address) = membership.peer_address(peer_id) else {
            warn!("[L-{}] no address found for peer {}", self.my_id, peer_id);
            return;
        };

        let request = self.build_append_request(
            current_term,
            commit_index,
            next_index,
            max_entries_per_append,
            raft_log,
        );
        debug!(
            "[L-{} -> F-{}] replicating {} entries, prev={}",
            self.my_id,
            peer_id,
            request.entries.len(),
            request.prev_log_index
        );

        let token = tenure.clone();
        let transport = Arc::clone(transport);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                result = transport.send(address, RaftMessage::AppendEntries(request)) => {
                    if let Err(e) = result {
                        warn!("failed to send append request to peer {}: {:?}", peer_id, e);
                    }
                }
            }
        });
    }

    /// As Follower only
    fn handle_append_entries(
        &self,
        request: AppendEntriesRequest,
        commit_index: u64,
        raft_log: &Arc<ROF<T>>,
    ) -> Result<AppendResponseWithUpdates> {
        debug!("[F-{}] >> receive leader append request {:?}", self.my_id, request);

        let prev_log_ok = request.prev_log_index == 0
            || raft_log.entry_term(request.prev_log_index) == Some(request.prev_log_term);

        if !prev_log_ok {
            warn!(
                "[F-{}] prev log check failed: prev_log_index={}, prev_log_term={}, my last={}",
                self.my_id,
                request.prev_log_index,
                request.prev_log_term,
                raft_log.last_index()
            );
            return Ok(AppendResponseWithUpdates {
                success: false,
                last_matched_id: 0,
                commit_index_update: None,
            });
        }

        let last_matched_id = raft_log.filter_out_conflicts_and_append(request.prev_log_index, request.entries)?;

        let commit_index_update =
            Self::if_update_commit_index_as_follower(commit_index, last_matched_id, request.leader_commit);

        debug!(
            "[F-{}] append ok, last_matched_id={}, commit_index_update={:?}",
            self.my_id, last_matched_id, commit_index_update
        );

        Ok(AppendResponseWithUpdates {
            success: true,
            last_matched_id,
            commit_index_update,
        })
    }

    fn if_update_commit_index_as_follower(
        my_commit_index: u64,
        last_new_entry_index: u64,
        leader_commit_index: u64,
    ) -> Option<u64> {
        if leader_commit_index > my_commit_index {
            return Some(cmp::min(leader_commit_index, last_new_entry_index));
        }
        None
    }
}

impl<T> ReplicationHandler<T>
where T: TypeConfig
{
    pub fn new(my_id: u32) -> Self {
        Self {
            my_id,
            _phantom: PhantomData,
        }
    }

    /// Builds the request for a single peer from its next index.
    ///
    /// `prev_log_term` falls back to 0 when the entry at `prev_log_index`
    /// is gone; the follower will reject and the next index walks back.
    pub(super) fn build_append_request(
        &self,
        current_term: u64,
        commit_index: u64,
        next_index: u64,
        max_entries_per_append: u64,
        raft_log: &Arc<ROF<T>>,
    ) -> AppendEntriesRequest {
        let prev_log_index = next_index.saturating_sub(1);
        let prev_log_term = if prev_log_index == 0 {
            0
        } else {
            raft_log.entry_term(prev_log_index).unwrap_or(0)
        };

        let last_index = raft_log.last_index();
        let entries = if last_index >= next_index && max_entries_per_append > 0 {
            let until_index = cmp::min(last_index, next_index + max_entries_per_append - 1);
            raft_log.get_entries_between(next_index..=until_index)
        } else {
            Vec::new()
        };

        AppendEntriesRequest {
            term: current_term,
            leader_id: self.my_id,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit: commit_index,
        }
    }
}
