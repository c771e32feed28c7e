use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio::time::Duration;

use super::*;
use crate::core::RaftEvent;
use crate::protocol::RaftMessage;
use crate::protocol::VoteRequest;

async fn loopback_transport(node_id: u32) -> UdpTransport {
    UdpTransport::bind(node_id, "127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind loopback socket")
}

/// # Case 1: a sent message surfaces as an inbound event on the peer
#[tokio::test]
async fn test_send_case1_delivered_as_event() {
    let sender = loopback_transport(1).await;
    let receiver = loopback_transport(2).await;
    let receiver_addr = receiver.local_addr().expect("local addr");

    let (event_tx, mut event_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let _listener = receiver.spawn_listener(event_tx, shutdown_rx);

    let request = VoteRequest {
        term: 3,
        candidate_id: 1,
        last_log_index: 7,
        last_log_term: 2,
    };
    sender
        .send(receiver_addr, RaftMessage::VoteRequest(request.clone()))
        .await
        .expect("send datagram");

    let event = timeout(Duration::from_secs(1), event_rx.recv())
        .await
        .expect("event within deadline")
        .expect("channel open");
    match event {
        RaftEvent::VoteRequest(received) => assert_eq!(received, request),
        other => panic!("unexpected event: {:?}", other),
    }
}

/// # Case 2: undecodable datagrams are dropped without killing the listener
#[tokio::test]
async fn test_send_case2_garbage_is_dropped() {
    let sender = loopback_transport(1).await;
    let receiver = loopback_transport(2).await;
    let receiver_addr = receiver.local_addr().expect("local addr");

    let (event_tx, mut event_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let _listener = receiver.spawn_listener(event_tx, shutdown_rx);

    // Raw bytes that cannot decode into any message
    let raw_socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    raw_socket
        .send_to(b"\xff\xff\xff garbage", receiver_addr)
        .await
        .expect("send garbage");

    // A valid message afterwards still gets through
    sender
        .send(
            receiver_addr,
            RaftMessage::VoteRequest(VoteRequest {
                term: 1,
                candidate_id: 1,
                last_log_index: 0,
                last_log_term: 0,
            }),
        )
        .await
        .expect("send datagram");

    let event = timeout(Duration::from_secs(1), event_rx.recv())
        .await
        .expect("event within deadline")
        .expect("channel open");
    assert!(matches!(event, RaftEvent::VoteRequest(_)));
}

/// # Case 3: shutdown signal stops the listener loop
#[tokio::test]
async fn test_listener_case3_stops_on_shutdown() {
    let receiver = loopback_transport(2).await;

    let (event_tx, _event_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let listener = receiver.spawn_listener(event_tx, shutdown_rx);

    shutdown_tx.send(()).expect("signal shutdown");

    timeout(Duration::from_secs(1), listener)
        .await
        .expect("listener exits after shutdown")
        .expect("listener task completes cleanly");
}
