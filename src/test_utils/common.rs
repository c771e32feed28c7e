use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tokio::sync::mpsc;

use crate::config::NodeConfig;
use crate::core::RaftContext;
use crate::core::RaftCoreHandlers;
use crate::core::RaftStorageHandles;
use crate::membership::ClusterMembership;
use crate::membership::NodeMeta;
use crate::protocol::Command;
use crate::protocol::Entry;
use crate::protocol::RaftMessage;
use crate::test_utils::ChannelTransport;
use crate::test_utils::MockTypeConfig;
use crate::MockElectionCore;
use crate::MockRaftLog;
use crate::MockReplicationCore;
use crate::MockStateMachine;
use crate::MockStateMachineHandler;
use crate::MockStateStorage;

static LOGGER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

/// Call at the top of a test to see `RUST_LOG` filtered output.
pub fn enable_logger() {
    Lazy::force(&LOGGER);
}

pub fn node_address(id: u32) -> SocketAddr {
    format!("127.0.0.1:{}", 9100 + id).parse().unwrap()
}

/// Roster with ids `1..=n`, addressed on consecutive loopback ports.
pub fn cluster_of(n: u32) -> Vec<NodeMeta> {
    (1..=n)
        .map(|id| NodeMeta {
            id,
            address: node_address(id),
        })
        .collect()
}

pub fn make_entry(
    index: u64,
    term: u64,
) -> Entry {
    let command = Command::Put {
        key: format!("key-{}", index),
        value: format!("value-{}", index).into_bytes(),
    };
    Entry {
        index,
        term,
        command: command.encode().unwrap(),
    }
}

pub fn make_entries(
    range: RangeInclusive<u64>,
    term: u64,
) -> Vec<Entry> {
    range.map(|index| make_entry(index, term)).collect()
}

pub fn test_node_config() -> Arc<NodeConfig> {
    Arc::new(NodeConfig::default())
}

/// A context over `MockTypeConfig` wired to a loopback transport and a three
/// node roster.
///
/// The log and state storage mocks answer the calls every role makes on
/// entry (empty log, accepted hard state writes). Everything else starts
/// without expectations, so a test swaps in its own mock before poking the
/// code under test:
///
/// ```ignore
/// let (mut context, _rx) = mock_raft_context(1);
/// let mut election = MockElectionCore::<MockTypeConfig>::new();
/// election.expect_broadcast_vote_requests().times(1).returning(|_, _, _, _| ());
/// context.handlers.election_handler = election;
/// ```
pub fn mock_raft_context(
    node_id: u32
) -> (RaftContext<MockTypeConfig>, mpsc::UnboundedReceiver<(SocketAddr, RaftMessage)>) {
    let mut raft_log = MockRaftLog::new();
    raft_log.expect_last_index().returning(|| 0);
    raft_log.expect_last_log_id().returning(|| None);

    let mut state_storage = MockStateStorage::new();
    state_storage.expect_save_hard_state().returning(|_| Ok(()));

    let (transport, message_rx) = ChannelTransport::pair();

    let context = RaftContext {
        node_id,
        storage: RaftStorageHandles {
            raft_log: Arc::new(raft_log),
            state_machine: Arc::new(MockStateMachine::new()),
            state_storage: Box::new(state_storage),
        },
        transport,
        membership: Arc::new(ClusterMembership::new(node_id, cluster_of(3))),
        handlers: RaftCoreHandlers {
            election_handler: MockElectionCore::new(),
            replication_handler: MockReplicationCore::new(),
            state_machine_handler: Arc::new(MockStateMachineHandler::new()),
        },
        node_config: test_node_config(),
    };

    (context, message_rx)
}
