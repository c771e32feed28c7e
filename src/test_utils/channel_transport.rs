use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::network::Transport;
use crate::protocol::RaftMessage;
use crate::Result;

/// In-process [`Transport`] that hands every outgoing message to a channel so
/// a test can assert on exactly what left the node, without touching sockets.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<(SocketAddr, RaftMessage)>,
}

impl ChannelTransport {
    /// Returns the transport plus the receiving end of its outbox.
    pub fn pair() -> (Arc<dyn Transport>, mpsc::UnboundedReceiver<(SocketAddr, RaftMessage)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelTransport { tx }), rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(
        &self,
        target: SocketAddr,
        message: RaftMessage,
    ) -> Result<()> {
        // A closed receiver just means the test stopped listening.
        let _ = self.tx.send((target, message));
        Ok(())
    }
}
