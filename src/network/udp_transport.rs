use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Transport;
use crate::constants::MAX_DATAGRAM_PAYLOAD;
use crate::core::RaftEvent;
use crate::protocol::RaftMessage;
use crate::NetworkError;
use crate::Result;

/// Datagram transport bound to this node's listen address.
///
/// One socket serves both directions: inbound messages are pumped into the
/// consensus event channel by [`spawn_listener`](UdpTransport::spawn_listener),
/// outbound messages go through [`Transport::send`].
pub struct UdpTransport {
    node_id: u32,
    socket: Arc<UdpSocket>,
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("node_id", &self.node_id)
            .field("local_addr", &self.socket.local_addr().ok())
            .finish()
    }
}

impl UdpTransport {
    pub async fn bind(
        node_id: u32,
        addr: SocketAddr,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| NetworkError::Bind { addr, source })?;
        info!("[Node-{}] datagram socket bound at {}", node_id, addr);

        Ok(Self {
            node_id,
            socket: Arc::new(socket),
        })
    }

    /// Address the socket actually bound to (resolves port 0 in tests)
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Starts the receive loop feeding decoded messages into `event_tx`.
    ///
    /// Undecodable datagrams are logged and dropped. The loop ends on
    /// shutdown signal or when the event channel closes.
    pub fn spawn_listener(
        &self,
        event_tx: mpsc::Sender<RaftEvent>,
        mut shutdown_signal: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let node_id = self.node_id;
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_PAYLOAD];
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_signal.changed() => {
                        info!("[Node-{}] datagram listener shutting down", node_id);
                        return;
                    }
                    received = socket.recv_from(&mut buf) => {
                        let (len, from) = match received {
                            Ok(received) => received,
                            Err(e) => {
                                warn!("[Node-{}] datagram receive error: {}", node_id, e);
                                continue;
                            }
                        };
                        let message = match RaftMessage::decode(&buf[..len]) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!(
                                    "[Node-{}] dropping undecodable datagram from {}: {}",
                                    node_id, from, e
                                );
                                continue;
                            }
                        };
                        trace!("[Node-{}] received {:?} from {}", node_id, message, from);
                        if event_tx.send(RaftEvent::from(message)).await.is_err() {
                            debug!("[Node-{}] event channel closed, stopping listener", node_id);
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(
        &self,
        target: SocketAddr,
        message: RaftMessage,
    ) -> Result<()> {
        let payload = message.encode()?;
        if payload.len() > MAX_DATAGRAM_PAYLOAD {
            return Err(NetworkError::MessageTooLarge {
                size: payload.len(),
                limit: MAX_DATAGRAM_PAYLOAD,
            }
            .into());
        }

        self.socket
            .send_to(&payload, target)
            .await
            .map_err(|source| NetworkError::SendFailed { target, source })?;
        trace!("[Node-{}] sent {:?} to {}", self.node_id, message, target);

        Ok(())
    }
}
