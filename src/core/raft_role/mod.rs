pub mod candidate_state;
pub mod follower_state;
pub mod leader_state;
pub mod role_state;

#[cfg(test)]
mod leader_state_test;

use candidate_state::CandidateState;
use follower_state::FollowerState;
use leader_state::LeaderState;
use role_state::RaftRoleState;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use super::RaftContext;
use super::RaftEvent;
use super::RoleEvent;
use crate::Result;
use crate::TypeConfig;

/// The role state focuses solely on its own logic
/// and does not directly manipulate the underlying storage or network.
pub enum RaftRole<T: TypeConfig> {
    Follower(Box<FollowerState<T>>),
    Candidate(Box<CandidateState<T>>),
    Leader(Box<LeaderState<T>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardState {
    /// Persistent state on all servers(Updated on stable storage before
    /// responding to RPCs): latest term server has seen (initialized to 0
    /// on first boot, increases monotonically) Terms act as a logical clock
    /// in Raft, and they allow servers to detect obsolete information such as
    /// stale leaders.
    pub current_term: u64,

    /// Persistent state on all servers(Updated on stable storage before
    /// responding to RPCs): candidateId that received vote in current term
    /// (or null if none)
    pub voted_for: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct SharedState {
    pub node_id: u32,

    pub hard_state: HardState,

    /// Volatile state on all servers:
    /// index of highest log entry known to be committed (initialized to 0,
    /// increases monotonically)
    pub commit_index: u64,
}

impl SharedState {
    fn new(
        node_id: u32,
        hard_state_from_db: Option<HardState>,
        last_applied_index_option: Option<u64>,
    ) -> Self {
        let hard_state = hard_state_from_db.unwrap_or(HardState {
            current_term: 0,
            voted_for: None,
        });
        debug!(
            "New SharedState with hard_state_from_db: {:?}, last_applied_index_option: {:?}",
            &hard_state_from_db, &last_applied_index_option
        );
        Self {
            node_id,
            hard_state,
            // Everything applied must have been committed.
            commit_index: last_applied_index_option.unwrap_or(0),
        }
    }

    pub fn current_term(&self) -> u64 {
        self.hard_state.current_term
    }

    fn update_current_term(
        &mut self,
        term: u64,
    ) {
        self.hard_state.current_term = term;
    }

    fn increase_current_term(&mut self) {
        self.hard_state.current_term += 1;
    }

    pub fn voted_for(&self) -> Option<u32> {
        self.hard_state.voted_for
    }

    pub fn reset_voted_for(&mut self) {
        self.hard_state.voted_for = None;
    }

    pub fn update_voted_for(
        &mut self,
        candidate_id: u32,
    ) {
        self.hard_state.voted_for = Some(candidate_id);
    }
}

impl<T: TypeConfig> RaftRole<T> {
    pub fn state(&self) -> &dyn RaftRoleState<T = T> {
        match self {
            RaftRole::Follower(state) => state.as_ref(),
            RaftRole::Candidate(state) => state.as_ref(),
            RaftRole::Leader(state) => state.as_ref(),
        }
    }

    pub fn state_mut(&mut self) -> &mut dyn RaftRoleState<T = T> {
        match self {
            RaftRole::Follower(state) => state.as_mut(),
            RaftRole::Candidate(state) => state.as_mut(),
            RaftRole::Leader(state) => state.as_mut(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RaftRole::Follower(_) => "Follower",
            RaftRole::Candidate(_) => "Candidate",
            RaftRole::Leader(_) => "Leader",
        }
    }

    pub(crate) fn is_timer_expired(&self) -> bool {
        self.state().is_timer_expired()
    }

    pub(crate) fn reset_timer(&mut self) {
        self.state_mut().reset_timer()
    }

    pub fn next_deadline(&self) -> Instant {
        self.state().next_deadline()
    }

    pub fn become_leader(&self) -> Result<RaftRole<T>> {
        self.state().become_leader()
    }

    pub fn become_candidate(&self) -> Result<RaftRole<T>> {
        self.state().become_candidate()
    }

    pub fn become_follower(&self) -> Result<RaftRole<T>> {
        self.state().become_follower()
    }

    pub fn is_follower(&self) -> bool {
        self.state().is_follower()
    }

    pub fn is_candidate(&self) -> bool {
        self.state().is_candidate()
    }

    pub fn is_leader(&self) -> bool {
        self.state().is_leader()
    }

    pub fn current_term(&self) -> u64 {
        self.state().current_term()
    }

    #[cfg(test)]
    pub(crate) fn voted_for(&self) -> Option<u32> {
        self.state().voted_for()
    }

    #[cfg(test)]
    pub fn commit_index(&self) -> u64 {
        self.state().commit_index()
    }

    #[cfg(test)]
    pub fn match_index(
        &self,
        node_id: u32,
    ) -> Option<u64> {
        self.state().match_index(node_id)
    }

    #[cfg(test)]
    pub fn next_index(
        &self,
        node_id: u32,
    ) -> Option<u64> {
        self.state().next_index(node_id)
    }

    pub fn init_peers_next_index_and_match_index(
        &mut self,
        last_entry_id: u64,
        peer_ids: Vec<u32>,
    ) -> Result<()> {
        self.state_mut().init_peers_next_index_and_match_index(last_entry_id, peer_ids)
    }

    pub async fn tick(
        &mut self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        ctx: &RaftContext<T>,
    ) -> Result<()>
    where
        T: TypeConfig,
    {
        trace!("raft_role:tick");
        self.state_mut().tick(role_tx, ctx).await
    }

    pub async fn handle_raft_event(
        &mut self,
        raft_event: RaftEvent,
        ctx: &RaftContext<T>,
        role_tx: mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()>
    where
        T: TypeConfig,
    {
        self.state_mut().handle_raft_event(raft_event, ctx, role_tx).await
    }
}
