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

use super::candidate_state::CandidateState;
use super::leader_state::LeaderState;
use super::role_state::RaftRoleState;
use super::HardState;
use super::RaftRole;
use super::SharedState;
use crate::config::NodeConfig;
use crate::membership::LeaderInfo;
use crate::protocol::AppendEntriesReply;
use crate::protocol::AppendEntriesRequest;
use crate::protocol::RaftMessage;
use crate::protocol::VoteReply;
use crate::storage::RaftLog;
use crate::ConsensusError;
use crate::ElectionCore;
use crate::ElectionTimer;
use crate::NetworkError;
use crate::RaftContext;
use crate::RaftEvent;
use crate::ReplicationCore;
use crate::Result;
use crate::RoleEvent;
use crate::TypeConfig;

/// Follower node's state in Raft consensus.
///
/// Answers vote requests, accepts entries from the current leader and
/// converts to candidate once the election timer fires without any valid
/// leader contact.
pub struct FollowerState<T: TypeConfig> {
    /// State shared by all roles
    pub shared_state: SharedState,

    /// Leader heartbeat detection timer
    pub(super) timer: ElectionTimer,

    /// Node configuration (shared immutable reference)
    pub(crate) node_config: Arc<NodeConfig>,

    _marker: PhantomData<T>,
}

#[async_trait]
impl<T: TypeConfig> RaftRoleState for FollowerState<T> {
    type T = T;

    fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    fn shared_state_mut(&mut self) -> &mut SharedState {
        &mut self.shared_state
    }

    fn role_name(&self) -> &'static str {
        "Follower"
    }

    fn is_follower(&self) -> bool {
        true
    }

    fn become_candidate(&self) -> Result<RaftRole<T>> {
        info!(
            "[Follower-{}<{}>] >>> switch to Candidate now",
            self.node_id(),
            self.current_term(),
        );
        let mut candidate_state = CandidateState::from(self);
        // The first campaign starts on the very next tick instead of waiting
        // out another random timeout.
        candidate_state.timer.expire_now();
        Ok(RaftRole::Candidate(Box::new(candidate_state)))
    }

    fn become_follower(&self) -> Result<RaftRole<T>> {
        // Already a follower. A fresh timer is all the caller needs.
        debug!("[Follower-{}] stays Follower", self.node_id());
        Ok(RaftRole::Follower(Box::new(FollowerState::from(self))))
    }

    //--- Timer related ---
    fn is_timer_expired(&self) -> bool {
        self.timer.is_expired()
    }

    fn reset_timer(&mut self) {
        self.timer.reset()
    }

    fn next_deadline(&self) -> Instant {
        self.timer.next_deadline()
    }

    /// Election Timeout
    /// As follower,
    ///  step up as Candidate
    async fn tick(
        &mut self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        _ctx: &RaftContext<T>,
    ) -> Result<()> {
        debug!(
            "[Follower-{}] election timeout with no leader contact",
            self.node_id()
        );
        self.reset_timer();

        role_tx
            .send(RoleEvent::BecomeCandidate)
            .map_err(|e| NetworkError::SignalSendFailed(e.to_string()))?;

        Ok(())
    }

    async fn handle_raft_event(
        &mut self,
        raft_event: RaftEvent,
        ctx: &RaftContext<T>,
        role_tx: mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()> {
        match raft_event {
            RaftEvent::VoteRequest(vote_request) => {
                let candidate_id = vote_request.candidate_id;
                let decision = ctx.election_handler().evaluate_vote_request(
                    &vote_request,
                    self.current_term(),
                    self.voted_for(),
                    ctx.raft_log(),
                );

                if let Some(new_term) = decision.term_update {
                    self.update_current_term(new_term);
                    self.reset_voted_for();
                }
                if decision.vote_granted {
                    self.update_voted_for(candidate_id);
                    // A granted vote gives the candidate one full timeout to
                    // win before this node starts competing.
                    self.reset_timer();
                }
                // Both the adopted term and the recorded vote must survive a
                // crash before the reply leaves the node.
                if decision.term_update.is_some() || decision.vote_granted {
                    self.persist_hard_state(ctx)?;
                }

                let reply = VoteReply {
                    term: self.current_term(),
                    voter_id: self.node_id(),
                    vote_granted: decision.vote_granted,
                };
                debug!(
                    "[Follower-{}] vote reply to candidate {}: {:?}",
                    self.node_id(),
                    candidate_id,
                    &reply
                );
                ctx.send_to_peer(candidate_id, RaftMessage::VoteReply(reply));
            }

            RaftEvent::VoteReply(vote_reply) => {
                // Not campaigning. Only a higher term in a late reply matters.
                if vote_reply.term > self.current_term() {
                    self.update_current_term(vote_reply.term);
                    self.reset_voted_for();
                    self.persist_hard_state(ctx)?;
                } else {
                    trace!(
                        "[Follower-{}] ignore stale vote reply: {:?}",
                        self.node_id(),
                        vote_reply
                    );
                }
            }

            RaftEvent::AppendEntries(append_entries_request) => {
                self.handle_append_entries_request(append_entries_request, ctx, &role_tx)?;
            }

            RaftEvent::AppendEntriesReply(append_entries_reply) => {
                if append_entries_reply.term > self.current_term() {
                    self.update_current_term(append_entries_reply.term);
                    self.reset_voted_for();
                    self.persist_hard_state(ctx)?;
                } else {
                    trace!(
                        "[Follower-{}] ignore append reply from an old tenure: {:?}",
                        self.node_id(),
                        append_entries_reply
                    );
                }
            }

            RaftEvent::ClientPropose(client_propose_request, sender) => {
                warn!(
                    "[Follower-{}] rejects client proposal {}: not leader",
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

impl<T: TypeConfig> FollowerState<T> {
    pub fn new(
        node_id: u32,
        node_config: Arc<NodeConfig>,
        hard_state_from_db: Option<HardState>,
        last_applied_index_option: Option<u64>,
    ) -> Self {
        let election = &node_config.raft.election;
        Self {
            shared_state: SharedState::new(node_id, hard_state_from_db, last_applied_index_option),
            timer: ElectionTimer::new((
                election.election_timeout_min_ms,
                election.election_timeout_max_ms,
            )),
            node_config,
            _marker: PhantomData,
        }
    }

    /// Stale leaders get a refusal carrying our term so they step down.
    fn reject_stale_leader(
        &self,
        request: &AppendEntriesRequest,
        ctx: &RaftContext<T>,
    ) {
        debug!(
            "[Follower-{}] reject append from stale leader {} (term {} < {})",
            self.node_id(),
            request.leader_id,
            request.term,
            self.current_term()
        );
        let reply = AppendEntriesReply {
            term: self.current_term(),
            follower_id: self.node_id(),
            success: false,
            match_index: 0,
            last_log_index: ctx.raft_log().last_index(),
        };
        ctx.send_to_peer(request.leader_id, RaftMessage::AppendEntriesReply(reply));
    }

    fn handle_append_entries_request(
        &mut self,
        request: AppendEntriesRequest,
        ctx: &RaftContext<T>,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()> {
        if request.term < self.current_term() {
            self.reject_stale_leader(&request, ctx);
            return Ok(());
        }

        let term_changed = request.term > self.current_term();
        if term_changed {
            self.update_current_term(request.term);
            self.reset_voted_for();
        }

        // Any valid leader contact holds off the next election, even when
        // the consistency check below fails.
        self.reset_timer();

        let leader_info = LeaderInfo {
            leader_id: request.leader_id,
            term: request.term,
        };
        if ctx.membership().current_leader() != Some(leader_info) {
            role_tx
                .send(RoleEvent::NotifyLeaderChange(leader_info))
                .map_err(|e| NetworkError::SignalSendFailed(e.to_string()))?;
        }

        let leader_id = request.leader_id;
        let response = ctx.replication_handler().handle_append_entries(
            request,
            self.commit_index(),
            ctx.raft_log(),
        )?;

        if let Some(new_commit_index) = response.commit_index_update {
            self.update_commit_index_with_signal(new_commit_index, role_tx)?;
        }

        // The adopted term must hit disk before the reply leaves the node.
        if term_changed {
            self.persist_hard_state(ctx)?;
        }

        let reply = AppendEntriesReply {
            term: self.current_term(),
            follower_id: self.node_id(),
            success: response.success,
            match_index: if response.success { response.last_matched_id } else { 0 },
            last_log_index: ctx.raft_log().last_index(),
        };
        trace!(
            "[Follower-{}] reply to leader {}: {:?}",
            self.node_id(),
            leader_id,
            &reply
        );
        ctx.send_to_peer(leader_id, RaftMessage::AppendEntriesReply(reply));

        Ok(())
    }
}

impl<T: TypeConfig> From<&FollowerState<T>> for FollowerState<T> {
    fn from(follower_state: &FollowerState<T>) -> Self {
        let election = &follower_state.node_config.raft.election;
        Self {
            shared_state: follower_state.shared_state.clone(),
            timer: ElectionTimer::new((
                election.election_timeout_min_ms,
                election.election_timeout_max_ms,
            )),
            node_config: follower_state.node_config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: TypeConfig> From<&CandidateState<T>> for FollowerState<T> {
    fn from(candidate_state: &CandidateState<T>) -> Self {
        let election = &candidate_state.node_config.raft.election;
        Self {
            shared_state: candidate_state.shared_state.clone(),
            timer: ElectionTimer::new((
                election.election_timeout_min_ms,
                election.election_timeout_max_ms,
            )),
            node_config: candidate_state.node_config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: TypeConfig> From<&LeaderState<T>> for FollowerState<T> {
    fn from(leader_state: &LeaderState<T>) -> Self {
        let election = &leader_state.node_config.raft.election;
        Self {
            shared_state: leader_state.shared_state.clone(),
            timer: ElectionTimer::new((
                election.election_timeout_min_ms,
                election.election_timeout_max_ms,
            )),
            node_config: leader_state.node_config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: TypeConfig> Debug for FollowerState<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FollowerState")
            .field("shared_state", &self.shared_state)
            .finish()
    }
}
