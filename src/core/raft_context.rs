use std::fmt::Debug;
use std::sync::Arc;

use tracing::warn;

use crate::alias::EOF;
use crate::alias::REPOF;
use crate::alias::ROF;
use crate::alias::SMHOF;
use crate::alias::SMOF;
use crate::alias::SSOF;
use crate::config::NodeConfig;
use crate::membership::ClusterMembership;
use crate::network::Transport;
use crate::protocol::RaftMessage;
use crate::TypeConfig;

pub(crate) struct RaftStorageHandles<T: TypeConfig> {
    pub(crate) raft_log: Arc<ROF<T>>,
    pub(crate) state_machine: Arc<SMOF<T>>,
    pub(crate) state_storage: Box<SSOF<T>>,
}

pub(crate) struct RaftCoreHandlers<T: TypeConfig> {
    pub(crate) election_handler: EOF<T>,
    pub(crate) replication_handler: REPOF<T>,
    pub(crate) state_machine_handler: Arc<SMHOF<T>>,
}

/// Everything a role state needs to act on the node, bundled so that role
/// methods stay free of constructor plumbing.
pub(crate) struct RaftContext<T>
where T: TypeConfig
{
    pub(crate) node_id: u32,

    // Storages
    pub(crate) storage: RaftStorageHandles<T>,

    // Network
    pub(crate) transport: Arc<dyn Transport>,

    // Cluster Membership
    pub(crate) membership: Arc<ClusterMembership>,

    // Handlers
    pub(crate) handlers: RaftCoreHandlers<T>,

    // NodeConfig
    pub(crate) node_config: Arc<NodeConfig>,
}

impl<T> RaftContext<T>
where T: TypeConfig
{
    pub fn raft_log(&self) -> &Arc<ROF<T>> {
        &self.storage.raft_log
    }

    pub fn state_machine(&self) -> &Arc<SMOF<T>> {
        &self.storage.state_machine
    }

    pub fn state_storage(&self) -> &SSOF<T> {
        &self.storage.state_storage
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn replication_handler(&self) -> &REPOF<T> {
        &self.handlers.replication_handler
    }

    pub fn election_handler(&self) -> &EOF<T> {
        &self.handlers.election_handler
    }

    pub fn state_machine_handler(&self) -> &Arc<SMHOF<T>> {
        &self.handlers.state_machine_handler
    }

    pub fn node_config(&self) -> &Arc<NodeConfig> {
        &self.node_config
    }

    pub fn membership(&self) -> &Arc<ClusterMembership> {
        &self.membership
    }

    /// Fire-and-forget reply to a single peer on its own task.
    ///
    /// Callers must finish their durable writes before handing the message
    /// over; once spawned, the send is out of their hands.
    pub fn send_to_peer(
        &self,
        target_id: u32,
        message: RaftMessage,
    ) {
        let Some(address) = self.membership.peer_address(target_id) else {
            warn!("[{}] no address found for peer {}", self.node_id, target_id);
            return;
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.send(address, message).await {
                warn!("failed to send message to peer {}: {:?}", target_id, e);
            }
        });
    }
}

impl<T> Debug for RaftContext<T>
where T: TypeConfig
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RaftContext").field("node_id", &self.node_id).finish()
    }
}
