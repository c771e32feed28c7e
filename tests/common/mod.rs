//! In-process cluster harness for multi-node scenario tests.
//!
//! Nodes run as real consensus actors inside one tokio runtime. Their
//! transports all route through a shared [`ClusterRouter`], so a test can cut
//! a node off or bring it back without touching sockets.

use std::collections::HashMap;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use raftcell::ClientProposeResponse;
use raftcell::Command;
use raftcell::LeaderInfo;
use raftcell::Node;
use raftcell::NodeBuilder;
use raftcell::NodeConfig;
use raftcell::NodeMeta;
use raftcell::RaftEvent;
use raftcell::RaftMessage;
use raftcell::RaftTypeConfig;
use raftcell::Result;
use raftcell::Transport;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Polling step used by every await helper.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Upper bound on any await helper: 500 polls at 20ms each, 10 seconds.
const MAX_POLLS: usize = 500;

/// Message fabric connecting every node's outbound transport to every other
/// node's inbound event queue.
pub struct ClusterRouter {
    inboxes: RwLock<HashMap<SocketAddr, mpsc::Sender<RaftEvent>>>,
    isolated: RwLock<HashSet<SocketAddr>>,
}

impl ClusterRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inboxes: RwLock::new(HashMap::new()),
            isolated: RwLock::new(HashSet::new()),
        })
    }

    /// Routes future messages for `address` into `inbox`, replacing any
    /// earlier registration for the same address.
    pub fn register(
        &self,
        address: SocketAddr,
        inbox: mpsc::Sender<RaftEvent>,
    ) {
        self.inboxes.write().insert(address, inbox);
    }

    /// Silently drops every message to or from `address` until [`Self::heal`].
    pub fn isolate(
        &self,
        address: SocketAddr,
    ) {
        self.isolated.write().insert(address);
    }

    pub fn heal(
        &self,
        address: SocketAddr,
    ) {
        self.isolated.write().remove(&address);
    }

    async fn deliver(
        &self,
        from: SocketAddr,
        target: SocketAddr,
        message: RaftMessage,
    ) {
        {
            let isolated = self.isolated.read();
            if isolated.contains(&from) || isolated.contains(&target) {
                return;
            }
        }
        let inbox = self.inboxes.read().get(&target).cloned();
        if let Some(inbox) = inbox {
            // A closed inbox is a stopped node. Losing the message is exactly
            // what sending to a dead peer looks like.
            let _ = inbox.send(RaftEvent::from(message)).await;
        }
    }
}

/// Outbound half handed to each node: forwards into the shared router.
pub struct RouterTransport {
    from: SocketAddr,
    router: Arc<ClusterRouter>,
}

#[async_trait]
impl Transport for RouterTransport {
    async fn send(
        &self,
        target: SocketAddr,
        message: RaftMessage,
    ) -> Result<()> {
        self.router.deliver(self.from, target, message).await;
        Ok(())
    }
}

struct RunningNode {
    node: Arc<Node<RaftTypeConfig>>,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

/// A cluster of live nodes plus the controls to stop, restart, and
/// (dis)connect them.
pub struct TestCluster {
    pub router: Arc<ClusterRouter>,
    members: Vec<NodeMeta>,
    nodes: HashMap<u32, RunningNode>,
    // Kept for the whole test so a restarted node finds its old db files.
    dirs: HashMap<u32, TempDir>,
}

/// Starts `size` nodes with ids `1..=size` and returns once all are running.
///
/// Running is not the same as settled: callers that need a leader should
/// follow up with [`TestCluster::await_leader`].
pub async fn start_cluster(size: u32) -> TestCluster {
    let members: Vec<NodeMeta> = (1..=size)
        .map(|id| NodeMeta {
            id,
            address: member_address(id),
        })
        .collect();

    let mut cluster = TestCluster {
        router: ClusterRouter::new(),
        members,
        nodes: HashMap::new(),
        dirs: HashMap::new(),
    };
    for id in 1..=size {
        let dir = tempfile::tempdir().expect("Should succeed to create node db dir");
        cluster.dirs.insert(id, dir);
        cluster.spawn_node(id).await;
    }
    cluster
}

impl TestCluster {
    /// Builds and runs one node against the already-created db dir.
    pub async fn spawn_node(
        &mut self,
        node_id: u32,
    ) {
        let address = member_address(node_id);
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let transport: Arc<dyn Transport> = Arc::new(RouterTransport {
            from: address,
            router: self.router.clone(),
        });

        let node = NodeBuilder::from_config(self.node_config(node_id), shutdown_rx)
            .transport(transport)
            .build()
            .await
            .expect("Should succeed to build node")
            .ready()
            .expect("Should succeed to take node out of builder");

        self.router.register(address, node.event_tx.clone());

        let run_node = node.clone();
        let handle = tokio::spawn(async move { run_node.run().await });
        self.nodes.insert(
            node_id,
            RunningNode {
                node,
                shutdown_tx,
                handle,
            },
        );
    }

    fn node_config(
        &self,
        node_id: u32,
    ) -> NodeConfig {
        let db_root_dir = self
            .dirs
            .get(&node_id)
            .unwrap_or_else(|| panic!("node {node_id} has no db dir"))
            .path()
            .to_path_buf();

        let mut config = NodeConfig::default();
        config.cluster.node_id = node_id;
        config.cluster.listen_address = member_address(node_id);
        config.cluster.initial_cluster = self.members.clone();
        config.cluster.db_root_dir = db_root_dir;
        // Tight timers keep the scenarios fast while leaving room between
        // heartbeat cadence and election timeout.
        config.raft.election.election_timeout_min_ms = 150;
        config.raft.election.election_timeout_max_ms = 300;
        config.raft.replication.heartbeat_interval_ms = 50;
        config.raft.commit.process_interval_ms = 5;
        config
    }

    /// Signals the node to shut down and waits for its actor to exit,
    /// returning the actor's exit result.
    ///
    /// The db dir is kept, so [`Self::restart`] brings the node back with all
    /// its persisted state.
    pub async fn stop(
        &mut self,
        node_id: u32,
    ) -> Result<()> {
        let running = self
            .nodes
            .remove(&node_id)
            .unwrap_or_else(|| panic!("node {node_id} is not running"));
        let _ = running.shutdown_tx.send(());
        let result = running.handle.await.expect("node task should not panic");
        drop(running.node);
        // Give the commit worker a moment to finish its final flush and
        // release the sled files.
        sleep(Duration::from_millis(100)).await;
        result
    }

    /// Boots a previously stopped node from its surviving db dir.
    pub async fn restart(
        &mut self,
        node_id: u32,
    ) {
        assert!(
            !self.nodes.contains_key(&node_id),
            "node {node_id} is still running"
        );
        // The stopped node's commit worker must have released the sled lock
        // before the files can be opened again.
        sleep(Duration::from_millis(100)).await;
        self.spawn_node(node_id).await;
    }

    pub fn node(
        &self,
        node_id: u32,
    ) -> Arc<Node<RaftTypeConfig>> {
        self.nodes
            .get(&node_id)
            .unwrap_or_else(|| panic!("node {node_id} is not running"))
            .node
            .clone()
    }

    pub fn address(
        &self,
        node_id: u32,
    ) -> SocketAddr {
        member_address(node_id)
    }

    pub fn running_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Waits until every running node reports the same live leader.
    pub async fn await_leader(&self) -> u32 {
        let ids = self.running_ids();
        self.await_leader_among(&ids).await
    }

    /// Waits until every node in `ids` reports the same leader and that
    /// leader is itself one of `ids`. Returns the agreed leader id.
    pub async fn await_leader_among(
        &self,
        ids: &[u32],
    ) -> u32 {
        for _ in 0..MAX_POLLS {
            let views: Vec<Option<LeaderInfo>> =
                ids.iter().map(|id| self.node(*id).leader_info()).collect();
            if let Some(Some(first)) = views.first() {
                let leader_id = first.leader_id;
                let agreed = views
                    .iter()
                    .copied()
                    .all(|view| view.map(|info| info.leader_id) == Some(leader_id));
                if agreed && ids.contains(&leader_id) {
                    return leader_id;
                }
            }
            sleep(POLL_INTERVAL).await;
        }
        panic!("nodes {ids:?} did not agree on a leader in time");
    }

    /// Waits until `node_id`'s applied state holds `expected` under `key`.
    pub async fn await_value(
        &self,
        node_id: u32,
        key: &str,
        expected: &[u8],
    ) {
        let node = self.node(node_id);
        for _ in 0..MAX_POLLS {
            if let Ok(Some(value)) = node.get(key.as_bytes()) {
                if value == expected {
                    return;
                }
            }
            sleep(POLL_INTERVAL).await;
        }
        panic!("node {node_id} never applied {key}");
    }

    /// Waits until every running node has applied `expected` under `key`.
    pub async fn await_value_everywhere(
        &self,
        key: &str,
        expected: &[u8],
    ) {
        for node_id in self.running_ids() {
            self.await_value(node_id, key, expected).await;
        }
    }

    pub async fn put(
        &self,
        node_id: u32,
        key: &str,
        value: &[u8],
    ) -> Result<ClientProposeResponse> {
        self.node(node_id)
            .propose(Command::Put {
                key: key.to_string(),
                value: value.to_vec(),
            })
            .await
    }

    /// Stops every remaining node, asserting each actor exits cleanly.
    pub async fn shutdown(mut self) {
        for node_id in self.running_ids() {
            if let Err(e) = self.stop(node_id).await {
                panic!("node {node_id} exited with {e:?}");
            }
        }
    }
}

fn member_address(node_id: u32) -> SocketAddr {
    // Never bound. The router transport keys deliveries off these addresses.
    format!("127.0.0.1:{}", 23000 + node_id)
        .parse()
        .expect("member address should parse")
}
