use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::timeout;

use super::candidate_state::CandidateState;
use super::leader_state::LeaderState;
use super::role_state::RaftRoleState;
use crate::membership::ClusterMembership;
use crate::protocol::AppendEntriesReply;
use crate::protocol::AppendEntriesRequest;
use crate::protocol::ClientProposeRequest;
use crate::protocol::Command;
use crate::protocol::LogId;
use crate::protocol::RaftMessage;
use crate::protocol::VoteRequest;
use crate::test_utils::cluster_of;
use crate::test_utils::make_entry;
use crate::test_utils::mock_raft_context;
use crate::test_utils::test_node_config;
use crate::test_utils::MockTypeConfig;
use crate::ConsensusError;
use crate::Error;
use crate::MockRaftLog;
use crate::MockReplicationCore;
use crate::MockStateStorage;
use crate::RaftEvent;
use crate::RoleEvent;

fn leader_with_term(term: u64) -> LeaderState<MockTypeConfig> {
    let mut state = LeaderState::new(1, test_node_config());
    state.update_current_term(term);
    state.update_voted_for(1);
    state
}

fn role_channel() -> (mpsc::UnboundedSender<RoleEvent>, mpsc::UnboundedReceiver<RoleEvent>) {
    mpsc::unbounded_channel()
}

fn success_reply(
    follower_id: u32,
    term: u64,
    match_index: u64,
) -> AppendEntriesReply {
    AppendEntriesReply {
        term,
        follower_id,
        success: true,
        match_index,
        last_log_index: match_index,
    }
}

fn reject_reply(
    follower_id: u32,
    term: u64,
    last_log_index: u64,
) -> AppendEntriesReply {
    AppendEntriesReply {
        term,
        follower_id,
        success: false,
        match_index: 0,
        last_log_index,
    }
}

/// # Case 1: winning a campaign produces a leader that heartbeats at once
///
/// ## Validation criterias:
/// 1. The term survives the conversion
/// 2. The heartbeat timer starts expired, the claim goes out on first tick
/// 3. Peer progress initializes to `last + 1` / `0`
#[test]
fn test_from_candidate_case1() {
    let mut candidate = CandidateState::<MockTypeConfig>::new(1, test_node_config());
    candidate.update_current_term(3);

    let mut state = LeaderState::from(&candidate);
    assert_eq!(state.current_term(), 3);
    assert!(state.is_leader());
    assert!(state.is_timer_expired());

    state
        .init_peers_next_index_and_match_index(6, vec![2, 3])
        .expect("init should succeed");
    assert_eq!(state.next_index(2), Some(7));
    assert_eq!(state.next_index(3), Some(7));
    assert_eq!(state.match_index(2), Some(0));
    assert_eq!(state.match_index(3), Some(0));
}

/// # Case 1: the heartbeat tick fans out replication to every peer
#[tokio::test]
async fn test_tick_case1() {
    let (mut context, _message_rx) = mock_raft_context(1);

    let mut replication_handler = MockReplicationCore::<MockTypeConfig>::new();
    replication_handler
        .expect_broadcast_append_entries()
        .times(1)
        .withf(|term, commit_index, peer_next_indices, _, _, _, _, _| {
            *term == 1 && *commit_index == 0 && peer_next_indices.get(&2) == Some(&4)
        })
        .returning(|_, _, _, _, _, _, _, _| ());
    context.handlers.replication_handler = replication_handler;

    let (role_tx, _role_rx) = role_channel();
    let mut state = leader_with_term(1);
    state.init_peers_next_index_and_match_index(3, vec![2, 3]).expect("init should succeed");

    state.tick(&role_tx, &context).await.expect("tick should succeed");
}

/// # Case 1: a proposal is appended locally, parked and replicated
///
/// ## Validation criterias:
/// 1. The command lands in the local log with the leader's term
/// 2. The fan-out happens in the same turn
/// 3. No majority yet, so the client keeps waiting and nothing commits
#[tokio::test]
async fn test_handle_client_propose_case1() {
    let (mut context, _message_rx) = mock_raft_context(1);

    let mut raft_log = MockRaftLog::new();
    raft_log
        .expect_append()
        .times(1)
        .withf(|term, _command| *term == 1)
        .returning(|_, _| Ok(make_entry(5, 1)));
    raft_log
        .expect_calculate_majority_matched_index()
        .times(1)
        .returning(|_, _, _| None);
    context.storage.raft_log = Arc::new(raft_log);

    let mut replication_handler = MockReplicationCore::<MockTypeConfig>::new();
    replication_handler
        .expect_broadcast_append_entries()
        .times(1)
        .returning(|_, _, _, _, _, _, _, _| ());
    context.handlers.replication_handler = replication_handler;

    let (role_tx, mut role_rx) = role_channel();
    let (response_tx, mut response_rx) = oneshot::channel();
    let mut state = leader_with_term(1);

    state
        .handle_raft_event(
            RaftEvent::ClientPropose(
                ClientProposeRequest {
                    request_id: "request-1".to_string(),
                    command: Command::Put {
                        key: "key".to_string(),
                        value: b"value".to_vec(),
                    },
                },
                response_tx,
            ),
            &context,
            role_tx,
        )
        .await
        .expect("event handling should succeed");

    assert_eq!(state.pending_ack_count(), 1);
    assert!(role_rx.try_recv().is_err());
    assert!(response_rx.try_recv().is_err());
}

/// # Case 2: a single node cluster commits its own proposal immediately
///
/// ## Validation criterias:
/// 1. The commit index advances without any peer ack
/// 2. The apply pipeline is notified
/// 3. The client gets the log id of its committed entry
#[tokio::test]
async fn test_handle_client_propose_case2() {
    let (mut context, _message_rx) = mock_raft_context(1);
    context.membership = Arc::new(ClusterMembership::new(1, cluster_of(1)));

    let mut raft_log = MockRaftLog::new();
    raft_log.expect_append().times(1).returning(|_, _| Ok(make_entry(1, 1)));
    raft_log
        .expect_calculate_majority_matched_index()
        .times(1)
        .withf(|term, commit_index, matched| *term == 1 && *commit_index == 0 && matched.is_empty())
        .returning(|_, _, _| Some(1));
    context.storage.raft_log = Arc::new(raft_log);

    let mut replication_handler = MockReplicationCore::<MockTypeConfig>::new();
    replication_handler
        .expect_broadcast_append_entries()
        .times(1)
        .returning(|_, _, _, _, _, _, _, _| ());
    context.handlers.replication_handler = replication_handler;

    let (role_tx, mut role_rx) = role_channel();
    let (response_tx, response_rx) = oneshot::channel();
    let mut state = leader_with_term(1);

    state
        .handle_raft_event(
            RaftEvent::ClientPropose(
                ClientProposeRequest {
                    request_id: "request-1".to_string(),
                    command: Command::Put {
                        key: "key".to_string(),
                        value: b"value".to_vec(),
                    },
                },
                response_tx,
            ),
            &context,
            role_tx,
        )
        .await
        .expect("event handling should succeed");

    assert_eq!(state.commit_index(), 1);
    let event = role_rx.try_recv().expect("commit event");
    assert!(matches!(event, RoleEvent::NotifyNewCommitIndex { new_commit_index: 1 }));

    let response = timeout(Duration::from_millis(200), response_rx)
        .await
        .expect("ack within 200ms")
        .expect("sender kept")
        .expect("proposal should commit");
    assert_eq!(response.log_id, LogId { term: 1, index: 1 });
    assert_eq!(state.pending_ack_count(), 0);
}

/// # Case 1: a majority ack moves progress, the commit index and the
/// parked client reply
#[tokio::test]
async fn test_handle_append_entries_reply_case1() {
    let (mut context, _message_rx) = mock_raft_context(1);

    let mut raft_log = MockRaftLog::new();
    raft_log
        .expect_calculate_majority_matched_index()
        .times(1)
        .withf(|term, commit_index, matched| {
            let mut sorted = matched.clone();
            sorted.sort_unstable();
            *term == 1 && *commit_index == 0 && sorted == vec![0, 3]
        })
        .returning(|_, _, _| Some(3));
    context.storage.raft_log = Arc::new(raft_log);

    let (role_tx, mut role_rx) = role_channel();
    let (ack_tx, ack_rx) = oneshot::channel();
    let mut state = leader_with_term(1);
    state.init_peers_next_index_and_match_index(0, vec![2, 3]).expect("init should succeed");
    state.park_pending_ack(3, ack_tx);

    state
        .handle_raft_event(RaftEvent::AppendEntriesReply(success_reply(2, 1, 3)), &context, role_tx)
        .await
        .expect("event handling should succeed");

    assert_eq!(state.match_index(2), Some(3));
    assert_eq!(state.next_index(2), Some(4));
    assert_eq!(state.commit_index(), 3);

    let event = role_rx.try_recv().expect("commit event");
    assert!(matches!(event, RoleEvent::NotifyNewCommitIndex { new_commit_index: 3 }));

    let response = timeout(Duration::from_millis(200), ack_rx)
        .await
        .expect("ack within 200ms")
        .expect("sender kept")
        .expect("proposal should commit");
    assert_eq!(response.log_id, LogId { term: 1, index: 3 });
    assert_eq!(state.pending_ack_count(), 0);
}

/// # Case 2: an out of order ack never moves progress backwards
#[tokio::test]
async fn test_handle_append_entries_reply_case2() {
    let (mut context, _message_rx) = mock_raft_context(1);

    let mut raft_log = MockRaftLog::new();
    raft_log.expect_calculate_majority_matched_index().times(1).returning(|_, _, _| None);
    context.storage.raft_log = Arc::new(raft_log);

    let (role_tx, _role_rx) = role_channel();
    let mut state = leader_with_term(1);
    state.update_match_index(2, 5).expect("seed match index");
    state.update_next_index(2, 6).expect("seed next index");

    state
        .handle_raft_event(RaftEvent::AppendEntriesReply(success_reply(2, 1, 3)), &context, role_tx)
        .await
        .expect("event handling should succeed");

    assert_eq!(state.match_index(2), Some(5));
    assert_eq!(state.next_index(2), Some(6));
}

/// # Case 3: a rejection walks next_index back one step and retries that
/// peer immediately
#[tokio::test]
async fn test_handle_append_entries_reply_case3() {
    let (mut context, _message_rx) = mock_raft_context(1);

    let mut replication_handler = MockReplicationCore::<MockTypeConfig>::new();
    replication_handler
        .expect_replicate_to_peer()
        .times(1)
        .withf(|peer_id, term, _commit, next_index, _, _, _, _, _| {
            *peer_id == 2 && *term == 1 && *next_index == 5
        })
        .returning(|_, _, _, _, _, _, _, _, _| ());
    context.handlers.replication_handler = replication_handler;

    let (role_tx, _role_rx) = role_channel();
    let mut state = leader_with_term(1);
    state.update_next_index(2, 6).expect("seed next index");

    state
        .handle_raft_event(
            RaftEvent::AppendEntriesReply(reject_reply(2, 1, 10)),
            &context,
            role_tx,
        )
        .await
        .expect("event handling should succeed");

    assert_eq!(state.next_index(2), Some(5));
}

/// # Case 4: a rejection from a short follower log jumps straight to its end
#[tokio::test]
async fn test_handle_append_entries_reply_case4() {
    let (mut context, _message_rx) = mock_raft_context(1);

    let mut replication_handler = MockReplicationCore::<MockTypeConfig>::new();
    replication_handler
        .expect_replicate_to_peer()
        .times(1)
        .withf(|peer_id, _term, _commit, next_index, _, _, _, _, _| {
            *peer_id == 2 && *next_index == 3
        })
        .returning(|_, _, _, _, _, _, _, _, _| ());
    context.handlers.replication_handler = replication_handler;

    let (role_tx, _role_rx) = role_channel();
    let mut state = leader_with_term(1);
    state.update_next_index(2, 9).expect("seed next index");

    state
        .handle_raft_event(RaftEvent::AppendEntriesReply(reject_reply(2, 1, 2)), &context, role_tx)
        .await
        .expect("event handling should succeed");

    assert_eq!(state.next_index(2), Some(3));
}

/// # Case 5: a reply with a higher term deposes this leader
#[tokio::test]
async fn test_handle_append_entries_reply_case5() {
    let (mut context, _message_rx) = mock_raft_context(1);

    let mut state_storage = MockStateStorage::new();
    state_storage
        .expect_save_hard_state()
        .times(1)
        .withf(|hard_state| hard_state.current_term == 9 && hard_state.voted_for.is_none())
        .returning(|_| Ok(()));
    context.storage.state_storage = Box::new(state_storage);

    let (role_tx, mut role_rx) = role_channel();
    let mut state = leader_with_term(1);

    state
        .handle_raft_event(RaftEvent::AppendEntriesReply(reject_reply(2, 9, 0)), &context, role_tx)
        .await
        .expect("event handling should succeed");

    assert_eq!(state.current_term(), 9);
    let event = role_rx.try_recv().expect("step down event");
    assert!(matches!(event, RoleEvent::BecomeFollower(None)));
}

/// # Case 1: an equal term append claim is a duplicate of a dead election,
/// refuse it and stay leader
#[tokio::test]
async fn test_handle_append_entries_case1() {
    let (mut context, mut message_rx) = mock_raft_context(1);

    let mut raft_log = MockRaftLog::new();
    raft_log.expect_last_index().returning(|| 7);
    context.storage.raft_log = Arc::new(raft_log);

    let mut state_storage = MockStateStorage::new();
    state_storage.expect_save_hard_state().times(0);
    context.storage.state_storage = Box::new(state_storage);

    let (role_tx, mut role_rx) = role_channel();
    let mut state = leader_with_term(1);

    state
        .handle_raft_event(
            RaftEvent::AppendEntries(AppendEntriesRequest {
                term: 1,
                leader_id: 3,
                prev_log_index: 0,
                prev_log_term: 0,
                entries: vec![],
                leader_commit: 0,
            }),
            &context,
            role_tx,
        )
        .await
        .expect("event handling should succeed");

    assert!(role_rx.try_recv().is_err());

    let (_, message) = timeout(Duration::from_millis(200), message_rx.recv())
        .await
        .expect("reply within 200ms")
        .expect("transport channel open");
    match message {
        RaftMessage::AppendEntriesReply(reply) => {
            assert_eq!(reply.term, 1);
            assert!(!reply.success);
            assert_eq!(reply.last_log_index, 7);
        }
        other => panic!("expected an append reply, got {:?}", other),
    }
}

/// # Case 2: a higher term leader claim deposes this one, which replays the
/// append as follower
#[tokio::test]
async fn test_handle_append_entries_case2() {
    let (mut context, _message_rx) = mock_raft_context(1);

    let mut state_storage = MockStateStorage::new();
    state_storage
        .expect_save_hard_state()
        .times(1)
        .withf(|hard_state| hard_state.current_term == 4 && hard_state.voted_for.is_none())
        .returning(|_| Ok(()));
    context.storage.state_storage = Box::new(state_storage);

    let (role_tx, mut role_rx) = role_channel();
    let mut state = leader_with_term(1);

    state
        .handle_raft_event(
            RaftEvent::AppendEntries(AppendEntriesRequest {
                term: 4,
                leader_id: 3,
                prev_log_index: 0,
                prev_log_term: 0,
                entries: vec![],
                leader_commit: 0,
            }),
            &context,
            role_tx,
        )
        .await
        .expect("event handling should succeed");

    assert_eq!(state.current_term(), 4);
    let first = role_rx.try_recv().expect("step down event");
    assert!(matches!(first, RoleEvent::BecomeFollower(Some(3))));
    let second = role_rx.try_recv().expect("replay event");
    assert!(matches!(second, RoleEvent::ReprocessEvent(_)));
}

/// # Case 1: a vote request with a higher term deposes this leader, the
/// grant decision replays on the follower
#[tokio::test]
async fn test_handle_vote_request_case1() {
    let (mut context, _message_rx) = mock_raft_context(1);

    let mut state_storage = MockStateStorage::new();
    state_storage
        .expect_save_hard_state()
        .times(1)
        .withf(|hard_state| hard_state.current_term == 6 && hard_state.voted_for.is_none())
        .returning(|_| Ok(()));
    context.storage.state_storage = Box::new(state_storage);

    let (role_tx, mut role_rx) = role_channel();
    let mut state = leader_with_term(2);

    state
        .handle_raft_event(
            RaftEvent::VoteRequest(VoteRequest {
                term: 6,
                candidate_id: 2,
                last_log_index: 9,
                last_log_term: 5,
            }),
            &context,
            role_tx,
        )
        .await
        .expect("event handling should succeed");

    assert_eq!(state.current_term(), 6);
    let first = role_rx.try_recv().expect("step down event");
    assert!(matches!(first, RoleEvent::BecomeFollower(None)));
    let second = role_rx.try_recv().expect("replay event");
    assert!(matches!(second, RoleEvent::ReprocessEvent(_)));
}

/// # Case 2: an equal term candidate is refused
#[tokio::test]
async fn test_handle_vote_request_case2() {
    let (context, mut message_rx) = mock_raft_context(1);
    let (role_tx, mut role_rx) = role_channel();
    let mut state = leader_with_term(2);

    state
        .handle_raft_event(
            RaftEvent::VoteRequest(VoteRequest {
                term: 2,
                candidate_id: 2,
                last_log_index: 0,
                last_log_term: 0,
            }),
            &context,
            role_tx,
        )
        .await
        .expect("event handling should succeed");

    assert!(role_rx.try_recv().is_err());

    let (_, message) = timeout(Duration::from_millis(200), message_rx.recv())
        .await
        .expect("reply within 200ms")
        .expect("transport channel open");
    match message {
        RaftMessage::VoteReply(reply) => {
            assert_eq!(reply.term, 2);
            assert!(!reply.vote_granted);
        }
        other => panic!("expected a vote reply, got {:?}", other),
    }
}

/// # Case 1: the leader's commit index never regresses
#[test]
fn test_update_commit_index_case1() {
    let mut state = leader_with_term(1);

    state.update_commit_index(5).expect("advance should succeed");
    assert_eq!(state.commit_index(), 5);

    state.update_commit_index(3).expect("regression is refused, not an error");
    assert_eq!(state.commit_index(), 5);
}

/// # Case 1: the end of a tenure cancels in-flight sends and fails every
/// waiting proposal
#[test]
fn test_drop_case1() {
    let mut state = leader_with_term(1);
    let tenure = state.tenure_token();
    let (ack_tx, mut ack_rx) = oneshot::channel();
    state.park_pending_ack(4, ack_tx);

    drop(state);

    assert!(tenure.is_cancelled());
    let response = ack_rx.try_recv().expect("drop must answer the client");
    match response {
        Err(Error::Consensus(ConsensusError::ProposalDropped)) => {}
        other => panic!("expected a ProposalDropped error, got {:?}", other),
    }
}
