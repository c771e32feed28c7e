use std::cmp;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::candidate_state::CandidateState;
use super::role_state::RaftRoleState;
use super::RaftRole;
use super::SharedState;
use crate::config::NodeConfig;
use crate::protocol::AppendEntriesReply;
use crate::protocol::ClientProposeResponse;
use crate::protocol::LogId;
use crate::protocol::RaftMessage;
use crate::protocol::VoteReply;
use crate::storage::RaftLog;
use crate::ConsensusError;
use crate::HeartbeatTimer;
use crate::NetworkError;
use crate::RaftContext;
use crate::RaftEvent;
use crate::ReplicationCore;
use crate::Result;
use crate::RoleEvent;
use crate::TypeConfig;

/// Leader node's state in Raft consensus.
///
/// Owns the per-peer replication progress (`next_index` / `match_index`),
/// drives heartbeats and log fan-out, advances the commit index on majority
/// acknowledgement and answers waiting client proposals.
pub struct LeaderState<T: TypeConfig> {
    /// State shared by all roles
    pub shared_state: SharedState,

    /// Index of the next log entry to send to each peer
    pub(super) next_index: HashMap<u32, u64>,

    /// Highest log index known to be replicated on each peer
    pub(super) match_index: HashMap<u32, u64>,

    /// Client proposals waiting for their log index to commit,
    /// keyed by that index
    pending_acks: BTreeMap<u64, Vec<oneshot::Sender<Result<ClientProposeResponse>>>>,

    /// Heartbeat cadence
    timer: HeartbeatTimer,

    /// Cancelled when this leadership tenure ends, silencing any
    /// replication send still in flight
    tenure: CancellationToken,

    /// Node configuration (shared immutable reference)
    pub(crate) node_config: Arc<NodeConfig>,

    _marker: PhantomData<T>,
}

#[async_trait]
impl<T: TypeConfig> RaftRoleState for LeaderState<T> {
    type T = T;

    fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    fn shared_state_mut(&mut self) -> &mut SharedState {
        &mut self.shared_state
    }

    fn role_name(&self) -> &'static str {
        "Leader"
    }

    fn is_leader(&self) -> bool {
        true
    }

    /// Overwrites the default behavior.
    /// A leader's commit index only ever moves forward.
    fn update_commit_index(
        &mut self,
        new_commit_index: u64,
    ) -> Result<()> {
        if self.commit_index() < new_commit_index {
            debug!("update_commit_index to: {:?}", new_commit_index);
            self.shared_state.commit_index = new_commit_index;
        } else {
            warn!(
                "[Leader-{}] refused commit index regression: {} -> {}",
                self.node_id(),
                self.commit_index(),
                new_commit_index
            );
        }
        Ok(())
    }

    fn next_index(
        &self,
        node_id: u32,
    ) -> Option<u64> {
        Some(self.next_index.get(&node_id).copied().unwrap_or(1))
    }

    fn update_next_index(
        &mut self,
        node_id: u32,
        new_next_id: u64,
    ) -> Result<()> {
        debug!("update_next_index({}) to {}", node_id, new_next_id);
        self.next_index.insert(node_id, new_next_id);
        Ok(())
    }

    fn match_index(
        &self,
        node_id: u32,
    ) -> Option<u64> {
        self.match_index.get(&node_id).copied()
    }

    fn update_match_index(
        &mut self,
        node_id: u32,
        new_match_id: u64,
    ) -> Result<()> {
        debug!("update_match_index({}) to {}", node_id, new_match_id);
        self.match_index.insert(node_id, new_match_id);
        Ok(())
    }

    fn init_peers_next_index_and_match_index(
        &mut self,
        last_entry_id: u64,
        peer_ids: Vec<u32>,
    ) -> Result<()> {
        for peer_id in peer_ids {
            self.update_next_index(peer_id, last_entry_id + 1)?;
            self.update_match_index(peer_id, 0)?;
        }
        Ok(())
    }

    fn become_follower(&self) -> Result<RaftRole<T>> {
        info!(
            "[Leader-{}<{}>] >>> switch to Follower now",
            self.node_id(),
            self.current_term(),
        );
        Ok(RaftRole::Follower(Box::new(self.into())))
    }

    fn is_timer_expired(&self) -> bool {
        self.timer.is_expired()
    }

    fn reset_timer(&mut self) {
        self.timer.reset()
    }

    fn next_deadline(&self) -> Instant {
        self.timer.next_deadline()
    }

    /// Heartbeat timeout: replicate to every peer, with entries for the ones
    /// that lag behind and empty heartbeats for the ones that are current.
    async fn tick(
        &mut self,
        _role_tx: &mpsc::UnboundedSender<RoleEvent>,
        ctx: &RaftContext<T>,
    ) -> Result<()> {
        self.reset_timer();
        self.broadcast_replication(ctx);
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
                    // Deposed. Step down and let the follower evaluate the
                    // grant.
                    self.update_current_term(vote_request.term);
                    self.reset_voted_for();
                    self.persist_hard_state(ctx)?;

                    self.send_become_follower_event(&role_tx, None)?;
                    self.send_replay_raft_event(&role_tx, RaftEvent::VoteRequest(vote_request))?;
                } else {
                    debug!(
                        "[Leader-{}] refuses vote for candidate {} (term {})",
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
                } else {
                    trace!(
                        "[Leader-{}] ignore vote reply from an old election: {:?}",
                        self.node_id(),
                        vote_reply
                    );
                }
            }

            RaftEvent::AppendEntries(append_entries_request) => {
                if append_entries_request.term > my_term {
                    info!(
                        "[Leader-{}] leader {} claims term {} > {}, stepping down",
                        self.node_id(),
                        append_entries_request.leader_id,
                        append_entries_request.term,
                        my_term
                    );
                    self.update_current_term(append_entries_request.term);
                    self.reset_voted_for();
                    self.persist_hard_state(ctx)?;

                    self.send_become_follower_event(
                        &role_tx,
                        Some(append_entries_request.leader_id),
                    )?;
                    self.send_replay_raft_event(
                        &role_tx,
                        RaftEvent::AppendEntries(append_entries_request),
                    )?;
                } else {
                    // Within one term at most one leader wins the election,
                    // so an equal-term request here can only be a duplicate
                    // of an already dead claim.
                    warn!(
                        "[Leader-{}] reject append from fake leader {} (term {} <= {})",
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
                }
            }

            RaftEvent::AppendEntriesReply(append_entries_reply) => {
                if append_entries_reply.term > my_term {
                    self.update_current_term(append_entries_reply.term);
                    self.reset_voted_for();
                    self.persist_hard_state(ctx)?;

                    self.send_become_follower_event(&role_tx, None)?;
                } else if append_entries_reply.term == my_term {
                    self.handle_replication_progress(append_entries_reply, ctx, &role_tx)?;
                } else {
                    trace!(
                        "[Leader-{}] ignore append reply from an old tenure: {:?}",
                        self.node_id(),
                        append_entries_reply
                    );
                }
            }

            RaftEvent::ClientPropose(client_propose_request, sender) => {
                self.process_client_propose(client_propose_request, sender, ctx, &role_tx)?;
            }
        }
        Ok(())
    }
}

impl<T: TypeConfig> LeaderState<T> {
    /// Appends the proposal to the local log, parks the reply sender until
    /// the entry commits and pushes the entry out to all peers right away.
    fn process_client_propose(
        &mut self,
        client_propose_request: crate::protocol::ClientProposeRequest,
        sender: oneshot::Sender<Result<ClientProposeResponse>>,
        ctx: &RaftContext<T>,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()> {
        let command = match client_propose_request.command.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                sender.send(Err(e)).map_err(|_| {
                    NetworkError::SignalSendFailed(
                        "client propose reply receiver dropped".to_string(),
                    )
                })?;
                return Ok(());
            }
        };

        // The local append is durable before any replication request leaves.
        let entry = ctx.raft_log().append(self.current_term(), command)?;
        debug!(
            "[Leader-{}] proposal {} appended at index {}",
            self.node_id(),
            client_propose_request.request_id,
            entry.index
        );

        self.pending_acks.entry(entry.index).or_default().push(sender);

        self.broadcast_replication(ctx);
        self.reset_timer();

        // A single node cluster commits on its own match.
        self.try_advance_commit(ctx, role_tx)?;

        Ok(())
    }

    fn broadcast_replication(
        &self,
        ctx: &RaftContext<T>,
    ) {
        ctx.replication_handler().broadcast_append_entries(
            self.current_term(),
            self.commit_index(),
            &self.next_index,
            ctx.raft_log(),
            ctx.membership(),
            ctx.transport(),
            self.node_config.raft.replication.max_entries_per_append,
            &self.tenure,
        );
    }

    /// Same-term reply from a follower: move its progress markers and react.
    fn handle_replication_progress(
        &mut self,
        reply: AppendEntriesReply,
        ctx: &RaftContext<T>,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()> {
        let follower_id = reply.follower_id;

        if reply.success {
            let old_match = self.match_index(follower_id).unwrap_or(0);
            // Replies can arrive out of order. Progress never moves backwards.
            let new_match = cmp::max(old_match, reply.match_index);
            self.update_match_index(follower_id, new_match)?;
            self.update_next_index(follower_id, new_match + 1)?;

            self.try_advance_commit(ctx, role_tx)?;
        } else {
            let old_next = self.next_index(follower_id).unwrap_or(1);
            // Walk back one step, but jump straight to the end of a short
            // follower log instead of probing every index.
            let new_next = cmp::max(
                1,
                cmp::min(old_next.saturating_sub(1), reply.last_log_index + 1),
            );
            debug!(
                "[Leader-{}] follower {} rejected append, next_index {} -> {}",
                self.node_id(),
                follower_id,
                old_next,
                new_next
            );
            self.update_next_index(follower_id, new_next)?;

            // Retry immediately rather than waiting out a heartbeat.
            ctx.replication_handler().replicate_to_peer(
                follower_id,
                self.current_term(),
                self.commit_index(),
                new_next,
                ctx.raft_log(),
                ctx.membership(),
                ctx.transport(),
                self.node_config.raft.replication.max_entries_per_append,
                &self.tenure,
            );
        }
        Ok(())
    }

    /// Advances the commit index if a majority of the cluster has stored a
    /// current-term entry, then releases the client proposals covered by it.
    fn try_advance_commit(
        &mut self,
        ctx: &RaftContext<T>,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()> {
        let matched_ids: Vec<u64> = self.match_index.values().copied().collect();

        if let Some(new_commit_index) = ctx.raft_log().calculate_majority_matched_index(
            self.current_term(),
            self.commit_index(),
            matched_ids,
        ) {
            debug!(
                "[Leader-{}] commit index {} -> {}",
                self.node_id(),
                self.commit_index(),
                new_commit_index
            );
            self.update_commit_index_with_signal(new_commit_index, role_tx)?;
            self.acknowledge_committed_proposals(new_commit_index);
        }
        Ok(())
    }

    fn acknowledge_committed_proposals(
        &mut self,
        new_commit_index: u64,
    ) {
        let remaining = self.pending_acks.split_off(&(new_commit_index + 1));
        let committed = std::mem::replace(&mut self.pending_acks, remaining);

        for (index, senders) in committed {
            for sender in senders {
                // Entries in pending_acks were appended during this tenure,
                // so their term is the current term.
                let response = ClientProposeResponse {
                    log_id: LogId {
                        term: self.current_term(),
                        index,
                    },
                };
                if sender.send(Ok(response)).is_err() {
                    warn!(
                        "[Leader-{}] client gave up waiting for index {}",
                        self.node_id(),
                        index
                    );
                }
            }
        }
    }

    fn send_become_follower_event(
        &self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        leader_id: Option<u32>,
    ) -> Result<()> {
        role_tx
            .send(RoleEvent::BecomeFollower(leader_id))
            .map_err(|e| NetworkError::SignalSendFailed(e.to_string()).into())
    }

    /// The stepped-down follower should process the triggering event itself.
    fn send_replay_raft_event(
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
        let heartbeat_interval_ms = node_config.raft.replication.heartbeat_interval_ms;
        Self {
            shared_state: SharedState::new(node_id, None, None),
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            pending_acks: BTreeMap::new(),
            timer: HeartbeatTimer::new(heartbeat_interval_ms),
            tenure: CancellationToken::new(),
            node_config,
            _marker: PhantomData,
        }
    }

    #[cfg(test)]
    pub(crate) fn tenure_token(&self) -> CancellationToken {
        self.tenure.clone()
    }

    #[cfg(test)]
    pub(crate) fn pending_ack_count(&self) -> usize {
        self.pending_acks.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn park_pending_ack(
        &mut self,
        index: u64,
        sender: oneshot::Sender<Result<ClientProposeResponse>>,
    ) {
        self.pending_acks.entry(index).or_default().push(sender);
    }
}

impl<T: TypeConfig> From<&CandidateState<T>> for LeaderState<T> {
    fn from(candidate_state: &CandidateState<T>) -> Self {
        let heartbeat_interval_ms = candidate_state.node_config.raft.replication.heartbeat_interval_ms;
        Self {
            shared_state: candidate_state.shared_state.clone(),
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            pending_acks: BTreeMap::new(),
            // The first heartbeat goes out immediately to assert leadership.
            timer: HeartbeatTimer::immediate(heartbeat_interval_ms),
            tenure: CancellationToken::new(),
            node_config: candidate_state.node_config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: TypeConfig> Drop for LeaderState<T> {
    fn drop(&mut self) {
        // Silence any replication send still in flight from this tenure.
        self.tenure.cancel();

        let dropped = std::mem::take(&mut self.pending_acks);
        let waiting: usize = dropped.values().map(Vec::len).sum();
        if waiting > 0 {
            info!(
                "[Leader-{}] tenure over, failing {} uncommitted proposal(s)",
                self.shared_state.node_id, waiting
            );
        }
        for (_, senders) in dropped {
            for sender in senders {
                let _ = sender.send(Err(ConsensusError::ProposalDropped.into()));
            }
        }
    }
}

impl<T: TypeConfig> Debug for LeaderState<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LeaderState")
            .field("shared_state", &self.shared_state)
            .field("next_index", &self.next_index)
            .field("match_index", &self.match_index)
            .finish()
    }
}
