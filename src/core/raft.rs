use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::sleep_until;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::follower_state::FollowerState;
use super::RaftContext;
use super::RaftCoreHandlers;
use super::RaftEvent;
use super::RaftRole;
use super::RaftStorageHandles;
use super::RoleEvent;
use crate::alias::EOF;
use crate::alias::REPOF;
use crate::alias::ROF;
use crate::alias::SMHOF;
use crate::alias::SMOF;
use crate::alias::SSOF;
use crate::config::NodeConfig;
use crate::membership::ClusterMembership;
use crate::membership::LeaderInfo;
use crate::network::Transport;
use crate::RaftLog;
use crate::Result;
use crate::StateMachine;
use crate::StateStorage;
use crate::TypeConfig;

/// The consensus actor: single owner of all Raft state.
///
/// Every input (network message, client proposal, timer, role signal) funnels
/// into one loop, so role transitions and log mutations never race. Anything
/// the roles want changed on the node comes back as a [`RoleEvent`] and is
/// applied here.
pub struct Raft<T>
where T: TypeConfig
{
    pub node_id: u32,
    pub(crate) role: RaftRole<T>,
    pub(crate) ctx: RaftContext<T>,

    // Network & client events
    pub(crate) event_tx: mpsc::Sender<RaftEvent>,
    event_rx: mpsc::Receiver<RaftEvent>,

    // Role signals out of the role states
    pub(crate) role_tx: mpsc::UnboundedSender<RoleEvent>,
    role_rx: mpsc::UnboundedReceiver<RoleEvent>,

    // For the apply pipeline to learn about new commits
    new_commit_listener: Vec<mpsc::UnboundedSender<u64>>,

    // Leadership observations for client-facing waits
    leader_listener: watch::Sender<Option<LeaderInfo>>,

    // Shutdown signal
    shutdown_signal: watch::Receiver<()>,
}

impl<T> Raft<T>
where T: TypeConfig
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        node_id: u32,
        raft_log: ROF<T>,
        state_machine: Arc<SMOF<T>>,
        state_storage: SSOF<T>,
        transport: Arc<dyn Transport>,
        election_handler: EOF<T>,
        replication_handler: REPOF<T>,
        state_machine_handler: Arc<SMHOF<T>>,
        membership: Arc<ClusterMembership>,
        node_config: Arc<NodeConfig>,
        role_tx: mpsc::UnboundedSender<RoleEvent>,
        role_rx: mpsc::UnboundedReceiver<RoleEvent>,
        event_tx: mpsc::Sender<RaftEvent>,
        event_rx: mpsc::Receiver<RaftEvent>,
        leader_listener: watch::Sender<Option<LeaderInfo>>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        // Recover term and vote before anything can touch the network.
        let hard_state_from_db = state_storage.load_hard_state();
        let last_applied = state_machine.last_applied();

        let ctx = RaftContext {
            node_id,
            storage: RaftStorageHandles {
                raft_log: Arc::new(raft_log),
                state_machine,
                state_storage: Box::new(state_storage),
            },
            transport,
            membership,
            handlers: RaftCoreHandlers {
                election_handler,
                replication_handler,
                state_machine_handler,
            },
            node_config: node_config.clone(),
        };

        // Every node boots as follower; elections sort out the rest.
        let role = RaftRole::Follower(Box::new(FollowerState::new(
            node_id,
            node_config,
            hard_state_from_db,
            Some(last_applied),
        )));

        Raft {
            node_id,
            role,
            ctx,

            event_tx,
            event_rx,

            role_tx,
            role_rx,

            new_commit_listener: Vec::new(),

            leader_listener,

            shutdown_signal,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        if self.role.is_timer_expired() {
            self.role.reset_timer();
        }

        loop {
            // Each role's tick resets its own deadline.
            let tick = sleep_until(self.role.next_deadline());

            tokio::select! {
                biased;

                // P0: shutdown
                _ = self.shutdown_signal.changed() => {
                    warn!("[Raft-{}] shutdown signal received", self.node_id);
                    return Ok(());
                }

                // P1: timer, drives elections and heartbeats
                _ = tick => {
                    trace!("[Raft-{}] tick", self.node_id);
                    if let Err(e) = self.role.tick(&self.role_tx, &self.ctx).await {
                        if e.is_fatal() {
                            error!("[Raft-{}] fatal error on tick: {:?}", self.node_id, e);
                            return Err(e);
                        }
                        error!("[Raft-{}] tick failed: {:?}", self.node_id, e);
                    }
                }

                // P2: role signals, applied before any further input
                Some(role_event) = self.role_rx.recv() => {
                    debug!("[Raft-{}] role event: {:?}", self.node_id, role_event);
                    if let Err(e) = self.handle_role_event(role_event).await {
                        if e.is_fatal() {
                            error!("[Raft-{}] fatal error on role event: {:?}", self.node_id, e);
                            return Err(e);
                        }
                        error!("[Raft-{}] role event failed: {:?}", self.node_id, e);
                    }
                }

                // P3: network messages and client proposals
                Some(raft_event) = self.event_rx.recv() => {
                    trace!("[Raft-{}] raft event: {:?}", self.node_id, raft_event);
                    if let Err(e) = self
                        .role
                        .handle_raft_event(raft_event, &self.ctx, self.role_tx.clone())
                        .await
                    {
                        if e.is_fatal() {
                            error!("[Raft-{}] fatal error on raft event: {:?}", self.node_id, e);
                            return Err(e);
                        }
                        error!("[Raft-{}] event handling failed: {:?}", self.node_id, e);
                    }
                }
            }
        }
    }

    /// Applies a role signal: transitions, leader bookkeeping, commit fan-out.
    pub(crate) async fn handle_role_event(
        &mut self,
        role_event: RoleEvent,
    ) -> Result<()> {
        match role_event {
            RoleEvent::BecomeFollower(leader_id_option) => {
                self.role = self.role.become_follower()?;

                // A step-down either learned who leads now or knows nobody
                // does until the next valid contact.
                match leader_id_option {
                    Some(leader_id) => {
                        self.ctx.membership.mark_leader(leader_id, self.role.current_term());
                    }
                    None => {
                        self.ctx.membership.reset_leader();
                    }
                }
                self.publish_leader();
            }

            RoleEvent::BecomeCandidate => {
                self.role = self.role.become_candidate()?;

                // Campaigning invalidates whatever leader was known.
                self.ctx.membership.reset_leader();
                self.publish_leader();
            }

            RoleEvent::BecomeLeader => {
                self.role = self.role.become_leader()?;

                let last_entry_id = self.ctx.raft_log().last_index();
                let peer_ids = self.ctx.membership.peer_ids();
                self.role.init_peers_next_index_and_match_index(last_entry_id, peer_ids)?;

                let term = self.role.current_term();
                self.ctx.membership.mark_leader(self.node_id, term);
                self.publish_leader();

                info!("[Raft-{}] >>> leader of term {}", self.node_id, term);
            }

            RoleEvent::NotifyNewCommitIndex { new_commit_index } => {
                self.notify_new_commit(new_commit_index);
            }

            RoleEvent::NotifyLeaderChange(leader_info) => {
                self.ctx.membership.mark_leader(leader_info.leader_id, leader_info.term);
                self.publish_leader();
            }

            RoleEvent::ReprocessEvent(raft_event) => {
                // Handled directly so no other queued input can slip between
                // the step-down and the replay.
                debug!("[Raft-{}] replay event after step down: {:?}", self.node_id, raft_event);
                self.role.handle_raft_event(*raft_event, &self.ctx, self.role_tx.clone()).await?;
            }
        };

        Ok(())
    }

    pub fn register_new_commit_listener(
        &mut self,
        tx: mpsc::UnboundedSender<u64>,
    ) {
        self.new_commit_listener.push(tx);
    }

    fn notify_new_commit(
        &self,
        new_commit_index: u64,
    ) {
        debug!("[Raft-{}] notify new commit index: {}", self.node_id, new_commit_index);
        for tx in &self.new_commit_listener {
            if let Err(e) = tx.send(new_commit_index) {
                error!("[Raft-{}] commit listener lost: {:?}", self.node_id, e);
            }
        }
    }

    fn publish_leader(&self) {
        let current = self.ctx.membership.current_leader();
        self.leader_listener.send_if_modified(|observed| {
            if *observed == current {
                false
            } else {
                *observed = current;
                true
            }
        });
    }
}

impl<T> Drop for Raft<T>
where T: TypeConfig
{
    fn drop(&mut self) {
        if let Err(e) = self
            .ctx
            .state_storage()
            .save_hard_state(self.role.state().shared_state().hard_state)
        {
            error!("[Raft-{}] persisting hard state on shutdown failed: {:?}", self.node_id, e);
        }

        if let Err(e) = self.ctx.raft_log().flush() {
            error!("[Raft-{}] raft log flush on shutdown failed: {:?}", self.node_id, e);
        }

        if let Err(e) = self.ctx.state_machine().flush() {
            error!("[Raft-{}] state machine flush on shutdown failed: {:?}", self.node_id, e);
        }

        info!("[Raft-{}] stopped", self.node_id);
    }
}
