use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::ElectionCore;
use super::VoteDecision;
use crate::alias::ROF;
use crate::core::is_target_log_more_recent;
use crate::membership::ClusterMembership;
use crate::network::Transport;
use crate::protocol::RaftMessage;
use crate::protocol::VoteRequest;
use crate::storage::RaftLog;
use crate::TypeConfig;

#[derive(Clone)]
pub struct ElectionHandler<T: TypeConfig> {
    pub(crate) my_id: u32,

    _phantom: PhantomData<T>,
}

impl<T> ElectionCore<T> for ElectionHandler<T>
where T: TypeConfig
{
    fn broadcast_vote_requests(
        &self,
        term: u64,
        raft_log: &Arc<ROF<T>>,
        membership: &Arc<ClusterMembership>,
        transport: &Arc<dyn Transport>,
    ) {
        let last_log_id = raft_log.last_log_id().unwrap_or_default();
        let request = VoteRequest {
            term,
            candidate_id: self.my_id,
            last_log_index: last_log_id.index,
            last_log_term: last_log_id.term,
        };
        debug!("broadcast_vote_requests: {:?}", &request);

        for peer in membership.peers() {
            let transport = Arc::clone(transport);
            let request = request.clone();
            tokio::spawn(async move {
                if let Err(e) = transport
                    .send(peer.address, RaftMessage::VoteRequest(request))
                    .await
                {
                    warn!("failed to send vote request to peer {}: {:?}", peer.id, e);
                }
            });
        }
    }

    fn evaluate_vote_request(
        &self,
        request: &VoteRequest,
        current_term: u64,
        voted_for: Option<u32>,
        raft_log: &Arc<ROF<T>>,
    ) -> VoteDecision {
        if request.term < current_term {
            debug!(
                "[me={}] reject vote for {}: stale term ({} < {})",
                self.my_id, request.candidate_id, request.term, current_term
            );
            return VoteDecision {
                vote_granted: false,
                term_update: None,
            };
        }

        let term_update = if request.term > current_term {
            Some(request.term)
        } else {
            None
        };
        // Adopting a higher term invalidates any vote cast in the old one.
        let effective_voted_for = if term_update.is_some() { None } else { voted_for };

        let last_log_id = raft_log.last_log_id().unwrap_or_default();
        let log_is_ok = is_target_log_more_recent(
            last_log_id.index,
            last_log_id.term,
            request.last_log_index,
            request.last_log_term,
        );
        let vote_is_free = match effective_voted_for {
            None => true,
            Some(id) => id == request.candidate_id,
        };

        let vote_granted = log_is_ok && vote_is_free;
        trace!(
            "[me={}] vote request from {} (term={}): log_is_ok={}, vote_is_free={}, granted={}",
            self.my_id, request.candidate_id, request.term, log_is_ok, vote_is_free, vote_granted
        );

        VoteDecision {
            vote_granted,
            term_update,
        }
    }
}

impl<T> ElectionHandler<T>
where T: TypeConfig
{
    pub fn new(my_id: u32) -> Self {
        Self {
            my_id,
            _phantom: PhantomData,
        }
    }
}
