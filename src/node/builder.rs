//! Assembles a [`Node`] from configuration plus optional component overrides.
//!
//! Every production default can be swapped before `build()`: storage goes
//! through the setters, the network through [`transport`](NodeBuilder::transport).
//! `build()` wires the channels, spawns the commit worker and the datagram
//! listener, and `ready()` hands out the finished node.
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let node = NodeBuilder::new(Some(config_path), shutdown_rx)?
//!     .build()
//!     .await?
//!     .ready()?;
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tracing::error;
use tracing::info;

use crate::alias::ROF;
use crate::alias::SMOF;
use crate::alias::SSOF;
use crate::config::NodeConfig;
use crate::init_sled_db;
use crate::membership::ClusterMembership;
use crate::network::Transport;
use crate::network::UdpTransport;
use crate::ClusterConfig;
use crate::CommitHandler;
use crate::DefaultCommitHandler;
use crate::DefaultStateMachineHandler;
use crate::ElectionHandler;
use crate::Node;
use crate::Raft;
use crate::RaftTypeConfig;
use crate::ReplicationHandler;
use crate::Result;
use crate::SledRaftLog;
use crate::SledStateMachine;
use crate::SledStateStorage;
use crate::StateMachine;
use crate::StorageError;
use crate::SystemError;

/// Fluent construction of a [`Node`] with overridable components.
pub struct NodeBuilder {
    pub(super) node_config: NodeConfig,
    pub(super) raft_log: Option<ROF<RaftTypeConfig>>,
    pub(super) state_machine: Option<Arc<SMOF<RaftTypeConfig>>>,
    pub(super) state_storage: Option<SSOF<RaftTypeConfig>>,
    pub(super) transport: Option<Arc<dyn Transport>>,
    pub(super) db: Option<Arc<sled::Db>>,
    pub(super) shutdown_signal: watch::Receiver<()>,

    pub(super) node: Option<Arc<Node<RaftTypeConfig>>>,
}

impl NodeBuilder {
    /// Loads configuration (defaults, optional file, environment) and
    /// prepares a builder with production components.
    pub fn new(
        config_path: Option<&Path>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let node_config = NodeConfig::load(config_path)?;
        Ok(Self::from_config(node_config, shutdown_signal))
    }

    /// Builds from an in-memory configuration, skipping file and environment
    /// lookup.
    pub fn from_config(
        node_config: NodeConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            node_config,
            raft_log: None,
            state_machine: None,
            state_storage: None,
            transport: None,
            db: None,
            shutdown_signal,
            node: None,
        }
    }

    /// Replaces the cluster section of the configuration.
    pub fn cluster_config(
        mut self,
        cluster_config: ClusterConfig,
    ) -> Self {
        self.node_config.cluster = cluster_config;
        self
    }

    /// Sets a custom Raft log storage implementation
    pub fn raft_log(
        mut self,
        raft_log: ROF<RaftTypeConfig>,
    ) -> Self {
        self.raft_log = Some(raft_log);
        self
    }

    /// Sets a custom state machine implementation
    pub fn state_machine(
        mut self,
        state_machine: Arc<SMOF<RaftTypeConfig>>,
    ) -> Self {
        self.state_machine = Some(state_machine);
        self
    }

    /// Sets a custom state storage implementation
    pub fn state_storage(
        mut self,
        state_storage: SSOF<RaftTypeConfig>,
    ) -> Self {
        self.state_storage = Some(state_storage);
        self
    }

    /// Sets a custom network transport implementation.
    ///
    /// When set, no datagram socket is bound; feeding inbound messages into
    /// the node's event channel becomes the caller's business.
    pub fn transport(
        mut self,
        transport: Arc<dyn Transport>,
    ) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses an already opened sled database instead of opening one under
    /// the configured `db_root_dir`.
    pub fn db(
        mut self,
        db: Arc<sled::Db>,
    ) -> Self {
        self.db = Some(db);
        self
    }

    /// Assembles every component, wires the channels and spawns the
    /// background workers. The consensus actor itself only starts inside
    /// [`Node::run`].
    pub async fn build(mut self) -> Result<Self> {
        let node_id = self.node_config.cluster.node_id;
        let node_config = Arc::new(self.node_config.clone());

        let raft_log = match self.raft_log.take() {
            Some(raft_log) => raft_log,
            None => SledRaftLog::new(self.shared_db(node_id)?, node_id)?,
        };
        let state_machine = match self.state_machine.take() {
            Some(state_machine) => state_machine,
            None => Arc::new(SledStateMachine::new(self.shared_db(node_id)?, node_id)?),
        };
        let state_storage = match self.state_storage.take() {
            Some(state_storage) => state_storage,
            None => SledStateStorage::new(self.shared_db(node_id)?)?,
        };

        let (event_tx, event_rx) = mpsc::channel(10240);

        let transport: Arc<dyn Transport> = match self.transport.take() {
            Some(transport) => transport,
            None => {
                let transport =
                    UdpTransport::bind(node_id, node_config.cluster.listen_address).await?;
                transport.spawn_listener(event_tx.clone(), self.shutdown_signal.clone());
                Arc::new(transport)
            }
        };

        let membership = Arc::new(ClusterMembership::new(
            node_id,
            node_config.cluster.initial_cluster.clone(),
        ));

        let state_machine_handler = Arc::new(DefaultStateMachineHandler::new(
            Some(state_machine.last_applied()),
            state_machine.clone(),
        ));

        let (role_tx, role_rx) = mpsc::unbounded_channel();
        let (leader_tx, leader_rx) = watch::channel(None);
        let (new_commit_tx, new_commit_rx) = mpsc::unbounded_channel();

        let mut raft_core = Raft::<RaftTypeConfig>::new(
            node_id,
            raft_log,
            state_machine.clone(),
            state_storage,
            transport,
            ElectionHandler::new(node_id),
            ReplicationHandler::new(node_id),
            state_machine_handler.clone(),
            membership,
            node_config.clone(),
            role_tx,
            role_rx,
            event_tx.clone(),
            event_rx,
            leader_tx,
            self.shutdown_signal.clone(),
        );

        raft_core.register_new_commit_listener(new_commit_tx);

        let commit_handler = DefaultCommitHandler::<RaftTypeConfig>::new(
            state_machine_handler,
            raft_core.ctx.raft_log().clone(),
            new_commit_rx,
            node_config.raft.commit.batch_size_threshold,
            node_config.raft.commit.process_interval_ms,
            self.shutdown_signal.clone(),
        );
        Self::spawn_commit_handler(commit_handler);

        self.node = Some(Arc::new(Node {
            node_id,
            raft_core: Arc::new(Mutex::new(raft_core)),
            event_tx,
            state_machine,
            leader_rx,
            node_config,
        }));
        Ok(self)
    }

    /// Returns the built node instance after successful construction.
    pub fn ready(self) -> Result<Arc<Node<RaftTypeConfig>>> {
        self.node.ok_or_else(|| {
            SystemError::NodeStartFailed("build() must run before ready()".to_string()).into()
        })
    }

    fn shared_db(
        &mut self,
        node_id: u32,
    ) -> Result<Arc<sled::Db>> {
        match &self.db {
            Some(db) => Ok(db.clone()),
            None => {
                // One sled database per node directory; log, state machine
                // and hard state live in separate trees of it.
                let db_root_dir = self.node_config.cluster.db_root_dir.join(node_id.to_string());
                let db = Arc::new(init_sled_db(&db_root_dir).map_err(StorageError::IoError)?);
                self.db = Some(db.clone());
                Ok(db)
            }
        }
    }

    fn spawn_commit_handler(mut commit_handler: DefaultCommitHandler<RaftTypeConfig>) {
        tokio::spawn(async move {
            match commit_handler.run().await {
                Ok(_) => {
                    info!("commit handler stopped");
                }
                Err(e) => {
                    error!("commit handler stopped with error: {:?}", e);
                }
            }
        });
    }
}
