use std::collections::HashSet;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::follower_state::FollowerState;
use super::role_state::RaftRoleState;
use super::RaftRole;
use super::SharedState;
use crate::config::NodeConfig;
use crate::protocol::AppendEntriesReply;
use crate::protocol::RaftMessage;
use crate::protocol::VoteReply;
use crate::storage::RaftLog;
use crate::ConsensusError;
use crate::ElectionCore;
use crate::ElectionTimer;
use crate::NetworkError;
use crate::RaftContext;
use crate::RaftEvent;
use crate::Result;
use crate::RoleEvent;
use crate::TypeConfig;

/// Candidate node's volatile state during leader election.
///
/// Each tick starts a fresh campaign: the term is bumped, the node votes for
/// itself and solicits votes from every peer. Votes are tallied here until a
/// majority promotes the node or a legitimate leader demotes it.
pub struct CandidateState<T: TypeConfig> {
    /// State shared by all roles
    pub shared_state: SharedState,

    /// Voters that granted this candidate their vote in the current term,
    /// including the candidate itself
    pub(super) votes: HashSet<u32>,

    /// Randomized campaign timeout
    pub(super) timer: ElectionTimer,

    /// Node configuration (shared immutable reference)
    pub(crate) node_config: Arc<NodeConfig>,

    _marker: PhantomData<T>,
}

#[async_trait]
impl<T: TypeConfig> RaftRoleState for CandidateState<T> {
    type T = T;

    fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    fn shared_state_mut(&mut self) -> &mut SharedState {
        &mut self.shared_state
    }

    fn role_name(&self) -> &'static str {
        "Candidate"
    }

    fn is_candidate(&self) -> bool {
        true
    }

    fn become_leader(&self) -> Result<RaftRole<T>> {
        info!(
            "[Candidate-{}<{}>] >>> switch to Leader now",
            self.node_id(),
            self.current_term(),
        );
        Ok(RaftRole::Leader(Box::new(self.into())))
    }

    fn become_follower(&self) -> Result<RaftRole<T>> {
        info!(
            "[Candidate-{}<{}>] >>> switch to Follower now",
            self.node_id(),
            self.current_term(),
        );
        Ok(RaftRole::Follower(Box::new(self.into())))
    }

    fn reset_timer(&mut self) {
        self.timer.reset()
    }

    fn is_timer_expired(&self) -> bool {
        self.timer.is_expired()
    }

    fn next_deadline(&self) -> Instant {
        self.timer.next_deadline()
    }

    /// Election Timeout: the previous campaign (if any) failed to reach a
    /// majority, so start a new one in a higher term.
    async fn tick(
        &mut self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        ctx: &RaftContext<T>,
    ) -> Result<()> {
        self.reset_timer();

        self.increase_current_term();
        self.reset_voted_for();
        self.votes.clear();

        let my_id = self.node_id();
        self.update_voted_for(my_id);
        self.votes.insert(my_id);

        // Term and self-vote must be durable before the first request
        // leaves the node.
        self.persist_hard_state(ctx)?;

        debug!(
            "[Candidate-{}] starts campaign for term {}",
            my_id,
            self.current_term()
        );

        // A single node cluster wins on its own vote.
        if ctx.membership().is_cluster_majority(self.votes.len()) {
            role_tx
                .send(RoleEvent::BecomeLeader)
                .map_err(|e| NetworkError::SignalSendFailed(e.to_string()))?;
            return Ok(());
        }

        ctx.election_handler().broadcast_vote_requests(
            self.current_term(),
            ctx.raft_log(),
            ctx.membership(),
            ctx.transport(),
        );

        Ok(())
    }

    async fn handle_raft_event(
        &mut self,
        raft_event: RaftEvent,
        ctx: &RaftContext<T>,
        role_tx: mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()> {
        let my_term = self.current_term();
        match raft_event {
            RaftEvent::VoteRequest(vote_request) => {
                if vote_request.term > my_term {
                    // A higher term cancels this campaign. Step down and let
                    // the follower evaluate the grant.
                    self.update_current_term(vote_request.term);
                    self.reset_voted_for();
                    self.persist_hard_state(ctx)?;

                    self.send_become_follower_event(&role_tx, None)?;
                    self.send_replay_raft_event(&role_tx, RaftEvent::VoteRequest(vote_request))?;
                } else {
                    // This candidate already voted for itself in this term.
                    debug!(
                        "[Candidate-{}] refuses vote for candidate {} (term {})",
                        self.node_id(),
                        vote_request.candidate_id,
                        vote_request.term
                    );
                    let reply = VoteReply {
                        term: my_term,
                        voter_id: self.node_id(),
                        vote_granted: false,
                    };
                    ctx.send_to_peer(vote_request.candidate_id, RaftMessage::VoteReply(reply));
                }
            }

            RaftEvent::VoteReply(vote_reply) => {
                if vote_reply.term > my_term {
                    self.update_current_term(vote_reply.term);
                    self.reset_voted_for();
                    self.persist_hard_state(ctx)?;

                    self.send_become_follower_event(&role_tx, None)?;
                } else if vote_reply.term == my_term && vote_reply.vote_granted {
                    self.votes.insert(vote_reply.voter_id);
                    debug!(
                        "[Candidate-{}] vote from {} ({}/{} voters)",
                        self.node_id(),
                        vote_reply.voter_id,
                        self.votes.len(),
                        ctx.membership().cluster_size()
                    );

                    if ctx.membership().is_cluster_majority(self.votes.len()) {
                        role_tx
                            .send(RoleEvent::BecomeLeader)
                            .map_err(|e| NetworkError::SignalSendFailed(e.to_string()))?;
                    }
                } else {
                    trace!(
                        "[Candidate-{}] ignore vote reply: {:?}",
                        self.node_id(),
                        vote_reply
                    );
                }
            }

            RaftEvent::AppendEntries(append_entries_request) => {
                if append_entries_request.term < my_term {
                    debug!(
                        "[Candidate-{}] reject append from stale leader {} (term {} < {})",
                        self.node_id(),
                        append_entries_request.leader_id,
                        append_entries_request.term,
                        my_term
                    );
                    let reply = AppendEntriesReply {
                        term: my_term,
                        follower_id: self.node_id(),
                        success: false,
                        match_index: 0,
                        last_log_index: ctx.raft_log().last_index(),
                    };
                    ctx.send_to_peer(
                        append_entries_request.leader_id,
                        RaftMessage::AppendEntriesReply(reply),
                    );
                    return Ok(());
                }

                // A leader with an equal or higher term has been elected.
                if append_entries_request.term > my_term {
                    self.update_current_term(append_entries_request.term);
                    self.reset_voted_for();
                    self.persist_hard_state(ctx)?;
                }

                info!(
                    "[Candidate-{}] leader {} claims term {}, stepping down",
                    self.node_id(),
                    append_entries_request.leader_id,
                    append_entries_request.term
                );
                self.send_become_follower_event(&role_tx, Some(append_entries_request.leader_id))?;
                self.send_replay_raft_event(
                    &role_tx,
                    RaftEvent::AppendEntries(append_entries_request),
                )?;
            }

            RaftEvent::AppendEntriesReply(append_entries_reply) => {
                if append_entries_reply.term > my_term {
                    self.update_current_term(append_entries_reply.term);
                    self.reset_voted_for();
                    self.persist_hard_state(ctx)?;

                    self.send_become_follower_event(&role_tx, None)?;
                } else {
                    trace!(
                        "[Candidate-{}] ignore append reply from an old tenure: {:?}",
                        self.node_id(),
                        append_entries_reply
                    );
                }
            }

            RaftEvent::ClientPropose(client_propose_request, sender) => {
                warn!(
                    "[Candidate-{}] rejects client proposal {}: election in progress",
                    self.node_id(),
                    client_propose_request.request_id
                );
                let leader_id = ctx.membership().current_leader().map(|leader| leader.leader_id);
                sender
                    .send(Err(ConsensusError::NotLeader { leader_id }.into()))
                    .map_err(|_| {
                        NetworkError::SignalSendFailed(
                            "client propose reply receiver dropped".to_string(),
                        )
                    })?;
            }
        }
        Ok(())
    }
}

impl<T: TypeConfig> CandidateState<T> {
    pub(super) fn send_become_follower_event(
        &self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        leader_id: Option<u32>,
    ) -> Result<()> {
        role_tx
            .send(RoleEvent::BecomeFollower(leader_id))
            .map_err(|e| NetworkError::SignalSendFailed(e.to_string()).into())
    }

    /// The stepped-down follower should process the triggering event itself.
    pub(super) fn send_replay_raft_event(
        &self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        raft_event: RaftEvent,
    ) -> Result<()> {
        role_tx
            .send(RoleEvent::ReprocessEvent(Box::new(raft_event)))
            .map_err(|e| NetworkError::SignalSendFailed(e.to_string()).into())
    }

    #[cfg(test)]
    pub fn new(
        node_id: u32,
        node_config: Arc<NodeConfig>,
    ) -> Self {
        Self {
            shared_state: SharedState::new(node_id, None, None),
            votes: HashSet::new(),
            timer: ElectionTimer::new((1, 2)),
            node_config,
            _marker: PhantomData,
        }
    }
}

impl<T: TypeConfig> From<&FollowerState<T>> for CandidateState<T> {
    fn from(follower_state: &FollowerState<T>) -> Self {
        let election = &follower_state.node_config.raft.election;
        Self {
            shared_state: follower_state.shared_state.clone(),
            votes: HashSet::new(),
            timer: ElectionTimer::new((
                election.election_timeout_min_ms,
                election.election_timeout_max_ms,
            )),
            node_config: follower_state.node_config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: TypeConfig> Debug for CandidateState<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CandidateState")
            .field("shared_state", &self.shared_state)
            .field("votes", &self.votes)
            .finish()
    }
}
