use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::HardState;
use super::RaftRole;
use super::SharedState;
use crate::ConsensusError;
use crate::Error;
use crate::NetworkError;
use crate::RaftContext;
use crate::RaftEvent;
use crate::Result;
use crate::RoleEvent;
use crate::TypeConfig;

#[async_trait]
pub trait RaftRoleState: Send + Sync + 'static {
    type T: TypeConfig;

    //--- For sharing state behaviors
    fn shared_state(&self) -> &SharedState;
    fn shared_state_mut(&mut self) -> &mut SharedState;
    fn node_id(&self) -> u32 {
        self.shared_state().node_id
    }

    fn role_name(&self) -> &'static str;

    // Leader states
    fn next_index(
        &self,
        _node_id: u32,
    ) -> Option<u64> {
        warn!("next_index requested on {}", self.role_name());
        None
    }
    fn update_next_index(
        &mut self,
        _node_id: u32,
        _new_next_id: u64,
    ) -> Result<()> {
        Err(self.not_leader("update_next_index"))
    }

    fn match_index(
        &self,
        _node_id: u32,
    ) -> Option<u64> {
        warn!("match_index requested on {}", self.role_name());
        None
    }
    fn update_match_index(
        &mut self,
        _node_id: u32,
        _new_match_id: u64,
    ) -> Result<()> {
        Err(self.not_leader("update_match_index"))
    }
    fn init_peers_next_index_and_match_index(
        &mut self,
        _last_entry_id: u64,
        _peer_ids: Vec<u32>,
    ) -> Result<()> {
        Err(self.not_leader("init_peers_next_index_and_match_index"))
    }

    fn is_follower(&self) -> bool {
        false
    }
    fn is_candidate(&self) -> bool {
        false
    }
    fn is_leader(&self) -> bool {
        false
    }

    fn become_leader(&self) -> Result<RaftRole<Self::T>> {
        Err(self.invalid_transition("Leader"))
    }
    fn become_candidate(&self) -> Result<RaftRole<Self::T>> {
        Err(self.invalid_transition("Candidate"))
    }
    fn become_follower(&self) -> Result<RaftRole<Self::T>> {
        Err(self.invalid_transition("Follower"))
    }

    //--- Shared States
    fn current_term(&self) -> u64 {
        self.shared_state().current_term()
    }
    fn update_current_term(
        &mut self,
        term: u64,
    ) {
        self.shared_state_mut().update_current_term(term)
    }
    fn increase_current_term(&mut self) {
        self.shared_state_mut().increase_current_term()
    }
    fn commit_index(&self) -> u64 {
        self.shared_state().commit_index
    }

    fn update_commit_index(
        &mut self,
        new_commit_index: u64,
    ) -> Result<()> {
        if self.commit_index() != new_commit_index {
            debug!("update_commit_index to: {:?}", new_commit_index);
            self.shared_state_mut().commit_index = new_commit_index;
        }
        Ok(())
    }

    fn update_commit_index_with_signal(
        &mut self,
        new_commit_index: u64,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()> {
        if let Err(e) = self.update_commit_index(new_commit_index) {
            error!("{}::update_commit_index: {:?}", self.role_name(), e);
            return Err(e);
        }
        role_tx
            .send(RoleEvent::NotifyNewCommitIndex { new_commit_index })
            .map_err(|e| {
                let error_str = format!("{:?}", e);
                error!("Failed to send: {}", error_str);
                NetworkError::SignalSendFailed(error_str).into()
            })
    }

    fn voted_for(&self) -> Option<u32> {
        self.shared_state().voted_for()
    }
    fn reset_voted_for(&mut self) {
        self.shared_state_mut().reset_voted_for()
    }
    fn update_voted_for(
        &mut self,
        candidate_id: u32,
    ) {
        self.shared_state_mut().update_voted_for(candidate_id)
    }

    /// Writes term and vote to stable storage.
    ///
    /// Every mutation of either field must flow through here before any
    /// message that depends on it leaves the node.
    fn persist_hard_state(
        &self,
        ctx: &RaftContext<Self::T>,
    ) -> Result<()> {
        use crate::storage::StateStorage;
        ctx.state_storage().save_hard_state(HardState {
            current_term: self.current_term(),
            voted_for: self.voted_for(),
        })
    }

    //--- Timer related ---
    fn next_deadline(&self) -> Instant;
    fn is_timer_expired(&self) -> bool;

    fn reset_timer(&mut self);

    async fn tick(
        &mut self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        ctx: &RaftContext<Self::T>,
    ) -> Result<()>;

    async fn handle_raft_event(
        &mut self,
        raft_event: RaftEvent,
        ctx: &RaftContext<Self::T>,
        role_tx: mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()>;

    //--- Error helpers ---
    fn not_leader(
        &self,
        operation: &str,
    ) -> Error {
        warn!("{} requires Leader role, current role: {}", operation, self.role_name());
        ConsensusError::RoleViolation {
            current_role: self.role_name(),
            required_role: "Leader",
        }
        .into()
    }

    fn invalid_transition(
        &self,
        target: &'static str,
    ) -> Error {
        warn!("invalid transition: {} -> {}", self.role_name(), target);
        ConsensusError::InvalidTransition {
            from: self.role_name(),
            to: target,
        }
        .into()
    }
}
