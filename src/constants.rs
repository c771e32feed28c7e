// -
// Database namespaces

/// Sled database tree namespaces
pub(crate) const RAFT_LOG_TREE: &str = "_raft_log_tree";
pub(crate) const STATE_MACHINE_TREE: &str = "_state_machine_tree";
pub(crate) const STATE_STORAGE_TREE: &str = "_state_storage_tree";

/// Sled entry key namespaces
pub(crate) const STATE_MACHINE_META_KEY_LAST_APPLIED_INDEX: &str = "_raft_last_applied_index";

pub(crate) const STATE_STORAGE_HARD_STATE_KEY: &str = "_state_storage_hard_state";

// -
// Network

/// Largest payload a single UDP datagram can carry (64KiB minus the IP and
/// UDP headers). Messages above this are rejected before hitting the socket.
pub(crate) const MAX_DATAGRAM_PAYLOAD: usize = 65_507;
