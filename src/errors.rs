//! Error hierarchy for the consensus engine.
//!
//! Protocol disagreements (stale terms, log mismatches) are not errors: they
//! are resolved by state transitions and never escalate. The types here cover
//! what genuinely fails: storage, the wire, configuration, and caller-facing
//! conditions such as submitting a command to a non-leader.

use std::net::SocketAddr;

use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration load or validation failures
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// Caller-facing consensus conditions
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// Whether the node must hard-stop instead of continuing its event loop.
    ///
    /// A failed durable write breaks the durability barrier: the node may no
    /// longer acknowledge RPCs or advance commit/apply state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::System(SystemError::Storage(_)) | Error::Fatal(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// Illegal Raft node role transitions
    #[error("invalid role transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Role permission conflict error
    #[error("operation requires {required_role} role but current role is {current_role}")]
    RoleViolation {
        current_role: &'static str,
        required_role: &'static str,
    },

    /// Command submitted to a node that is not the leader
    #[error("not the cluster leader (last known leader: {leader_id:?})")]
    NotLeader { leader_id: Option<u32> },

    /// The node stopped before the proposal reached a commit decision
    #[error("proposal dropped before a commit decision was reached")]
    ProposalDropped,

    /// The consensus actor is no longer running
    #[error("the consensus actor has stopped")]
    NodeStopped,
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Datagram socket could not be bound at startup
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Datagram transmission failure with peer context
    #[error("failed to send datagram to {target}")]
    SendFailed {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Encoded message exceeds the single-datagram limit
    #[error("message of {size} bytes exceeds the {limit} byte datagram limit")]
    MessageTooLarge { size: usize, limit: usize },

    /// Background task failed or panicked
    #[error("background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures during log or metadata operations
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Log storage invariant violations
    #[error("log storage failure: {0}")]
    LogStorage(String),

    /// Embedded database errors
    #[error("embedded database error: {0}")]
    DbError(String),
}

// Serialization is classified separately (it crosses wire and storage layers)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Network layer
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    // Storage layer
    #[error("storage operation failed: {0}")]
    Storage(#[from] StorageError),

    // Serialization
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    // Basic node operations
    #[error("node failed to start: {0}")]
    NodeStartFailed(String),
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        SerializationError::Bincode(err).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        NetworkError::TaskFailed(err).into()
    }
}
