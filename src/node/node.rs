//! Client-facing handle around the consensus actor.
//!
//! ## Example Usage
//! ```rust,ignore
//! let node = NodeBuilder::new(None, shutdown_rx)?.build().await?.ready()?;
//! tokio::spawn(async move {
//!     node.run().await
//! });
//! ```

use std::sync::Arc;

use nanoid::nanoid;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tracing::info;

use crate::alias::SMOF;
use crate::config::NodeConfig;
use crate::membership::LeaderInfo;
use crate::protocol::ClientProposeRequest;
use crate::protocol::ClientProposeResponse;
use crate::protocol::Command;
use crate::ConsensusError;
use crate::Raft;
use crate::RaftEvent;
use crate::Result;
use crate::StateMachine;
use crate::TypeConfig;

/// One cluster member, fully assembled.
///
/// Writes go through [`propose`](Node::propose); reads come straight out of
/// the local applied state machine. The consensus actor itself runs inside
/// [`run`](Node::run), everything else talks to it over channels.
pub struct Node<T>
where T: TypeConfig
{
    pub node_id: u32,
    pub(crate) raft_core: Arc<Mutex<Raft<T>>>,

    /// Entry into the consensus actor's event queue. Custom transports feed
    /// inbound messages through this.
    pub event_tx: mpsc::Sender<RaftEvent>,

    pub(crate) state_machine: Arc<SMOF<T>>,
    pub(crate) leader_rx: watch::Receiver<Option<LeaderInfo>>,

    pub node_config: Arc<NodeConfig>,
}

impl<T> Node<T>
where T: TypeConfig
{
    /// Drives the consensus actor until the shutdown signal fires or a
    /// fatal error stops it.
    pub async fn run(&self) -> Result<()> {
        info!("[Node-{}] consensus actor starting", self.node_id);

        let mut raft = self.raft_core.lock().await;
        raft.run().await
    }

    /// Submits `command` for replication.
    ///
    /// On the leader the reply resolves once the entry is committed, not
    /// merely appended. On any other node it fails fast with
    /// [`ConsensusError::NotLeader`] carrying the last known leader as a
    /// hint.
    pub async fn propose(
        &self,
        command: Command,
    ) -> Result<ClientProposeResponse> {
        let request = ClientProposeRequest {
            request_id: nanoid!(),
            command,
        };
        let (resp_tx, resp_rx) = oneshot::channel();

        self.event_tx
            .send(RaftEvent::ClientPropose(request, resp_tx))
            .await
            .map_err(|_| ConsensusError::NodeStopped)?;

        resp_rx.await.map_err(|_| ConsensusError::ProposalDropped)?
    }

    /// Reads `key` from the local applied state.
    ///
    /// Fresh on the leader once a proposal it acknowledged covered this key;
    /// possibly stale on any other node.
    pub fn get(
        &self,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        self.state_machine.get(key)
    }

    /// Last leadership announcement observed by this node, if any.
    pub fn leader_info(&self) -> Option<LeaderInfo> {
        *self.leader_rx.borrow()
    }

    pub fn is_leader(&self) -> bool {
        self.leader_info()
            .map(|leader| leader.leader_id == self.node_id)
            .unwrap_or(false)
    }

    /// Waits until some node is observed as leader and returns it.
    pub async fn wait_for_leader(&self) -> Result<LeaderInfo> {
        let mut leader_rx = self.leader_rx.clone();
        loop {
            if let Some(leader) = *leader_rx.borrow_and_update() {
                return Ok(leader);
            }
            leader_rx
                .changed()
                .await
                .map_err(|_| ConsensusError::NodeStopped)?;
        }
    }
}
