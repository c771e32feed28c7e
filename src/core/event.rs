use tokio::sync::oneshot;

use crate::membership::LeaderInfo;
use crate::protocol::AppendEntriesReply;
use crate::protocol::AppendEntriesRequest;
use crate::protocol::ClientProposeRequest;
use crate::protocol::ClientProposeResponse;
use crate::protocol::RaftMessage;
use crate::protocol::VoteReply;
use crate::protocol::VoteRequest;
use crate::Result;

/// Signals from a role state back to the main loop.
///
/// Role states never mutate the surrounding node directly. They return these
/// events and the loop performs transitions, leader bookkeeping and commit
/// notifications on their behalf.
#[derive(Debug)]
pub(crate) enum RoleEvent {
    BecomeFollower(Option<u32>), // BecomeFollower(Option<leader_id>)
    BecomeCandidate,
    BecomeLeader,

    /// Commit index moved, the apply pipeline should wake up
    NotifyNewCommitIndex { new_commit_index: u64 },

    /// A valid AppendEntries revealed a new leader while staying follower
    NotifyLeaderChange(LeaderInfo),

    /// Replay the raft event after stepping down to another role
    ReprocessEvent(Box<RaftEvent>),
}

/// One unit of work for the consensus loop.
///
/// Network messages and client proposals funnel into the same queue, so the
/// single consumer owns all Raft state without locking. Replies from peers
/// are events like anything else; there is no in-flight RPC state anywhere.
#[derive(Debug)]
pub enum RaftEvent {
    VoteRequest(VoteRequest),

    VoteReply(VoteReply),

    AppendEntries(AppendEntriesRequest),

    AppendEntriesReply(AppendEntriesReply),

    ClientPropose(
        ClientProposeRequest,
        oneshot::Sender<Result<ClientProposeResponse>>,
    ),
}

impl From<RaftMessage> for RaftEvent {
    fn from(message: RaftMessage) -> Self {
        match message {
            RaftMessage::VoteRequest(request) => RaftEvent::VoteRequest(request),
            RaftMessage::VoteReply(reply) => RaftEvent::VoteReply(reply),
            RaftMessage::AppendEntries(request) => RaftEvent::AppendEntries(request),
            RaftMessage::AppendEntriesReply(reply) => RaftEvent::AppendEntriesReply(reply),
        }
    }
}
