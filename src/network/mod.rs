//! Network abstraction layer over connectionless datagrams.
//!
//! Raft messages travel as single best-effort datagrams: no connection setup,
//! no retransmission, no ordering guarantee. Loss and duplication are handled
//! by the consensus protocol itself (timeouts re-trigger elections, heartbeats
//! re-send state), so the transport stays deliberately thin.

mod udp_transport;
pub use udp_transport::*;

#[cfg(test)]
mod udp_transport_test;

// Trait definition of the current module
// -----------------------------------------------------------------------------
// Core model in Raft: Transport Definition
//

use std::net::SocketAddr;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::protocol::RaftMessage;
use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fires one encoded message at `target` and forgets it.
    ///
    /// An `Ok` return means the datagram left this host, not that the peer
    /// received it. Callers must never block correctness on delivery.
    async fn send(
        &self,
        target: SocketAddr,
        message: RaftMessage,
    ) -> Result<()>;
}
