//! Wire vocabulary shared by the consensus core, the transport, and clients.

mod messages;

pub use messages::*;
