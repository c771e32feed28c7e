use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Identifier of a log entry: its term and index together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogId {
    pub term: u64,
    pub index: u64,
}

/// A single replicated log record.
///
/// `command` is opaque to the consensus core; only the state machine decodes
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub index: u64,
    pub term: u64,
    pub command: Vec<u8>,
}

impl Entry {
    pub fn log_id(&self) -> LogId {
        LogId {
            term: self.term,
            index: self.index,
        }
    }
}

/// Operations understood by the key/value state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
    /// Appends one item to the list stored under `key`.
    Append { key: String, item: Vec<u8> },
}

impl Command {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Command> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Messages exchanged between cluster nodes.
///
/// Every variant carries the sender's id and term, so a receiver can apply
/// the term comparison rules before looking at anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaftMessage {
    VoteRequest(VoteRequest),
    VoteReply(VoteReply),
    AppendEntries(AppendEntriesRequest),
    AppendEntriesReply(AppendEntriesReply),
}

impl RaftMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<RaftMessage> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn term(&self) -> u64 {
        match self {
            RaftMessage::VoteRequest(m) => m.term,
            RaftMessage::VoteReply(m) => m.term,
            RaftMessage::AppendEntries(m) => m.term,
            RaftMessage::AppendEntriesReply(m) => m.term,
        }
    }

    pub fn sender_id(&self) -> u32 {
        match self {
            RaftMessage::VoteRequest(m) => m.candidate_id,
            RaftMessage::VoteReply(m) => m.voter_id,
            RaftMessage::AppendEntries(m) => m.leader_id,
            RaftMessage::AppendEntriesReply(m) => m.follower_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: u32,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReply {
    pub term: u64,
    pub voter_id: u32,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: u32,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<Entry>,
    pub leader_commit: u64,
}

impl AppendEntriesRequest {
    pub fn is_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesReply {
    pub term: u64,
    pub follower_id: u32,
    pub success: bool,
    /// Highest index known replicated on the follower after this request.
    /// Meaningful only when `success` is true.
    pub match_index: u64,
    /// The follower's last log index, used as a backtrack hint on rejection.
    pub last_log_index: u64,
}

/// In-process client submission handed to the consensus actor.
#[derive(Debug)]
pub struct ClientProposeRequest {
    pub request_id: String,
    pub command: Command,
}

/// Acknowledgment that a proposed command was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientProposeResponse {
    pub log_id: LogId,
}
