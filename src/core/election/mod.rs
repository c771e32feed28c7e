mod election_handler;
pub use election_handler::*;


///--------------------------------------
/// Trait Definition
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

use crate::alias::ROF;
use crate::membership::ClusterMembership;
use crate::network::Transport;
use crate::protocol::VoteRequest;
use crate::TypeConfig;

/// Outcome of evaluating a peer's vote request against local state.
///
/// The handler never mutates node state. The caller applies `term_update`
/// first (adopting a higher term clears any previous vote), records the
/// vote if granted, and persists hard state before the reply leaves this
/// node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteDecision {
    pub vote_granted: bool,

    /// `Some(term)` when the request carries a higher term that this node
    /// must adopt regardless of whether the vote is granted.
    pub term_update: Option<u64>,
}

#[cfg_attr(test, automock)]
pub trait ElectionCore<T>: Send + Sync + 'static
where
    T: TypeConfig,
{
    /// Fans out vote requests for `term` to every peer in the cluster.
    ///
    /// Each request is sent on its own task and forgotten. Replies arrive
    /// later through the node's event queue, where the candidate tallies
    /// them against whatever term it holds by then.
    fn broadcast_vote_requests(
        &self,
        term: u64,
        raft_log: &Arc<ROF<T>>,
        membership: &Arc<ClusterMembership>,
        transport: &Arc<dyn Transport>,
    );

    /// Decides whether to grant `request` the vote.
    fn evaluate_vote_request(
        &self,
        request: &VoteRequest,
        current_term: u64,
        voted_for: Option<u32>,
        raft_log: &Arc<ROF<T>>,
    ) -> VoteDecision;
}
