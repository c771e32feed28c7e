//! Replicated collection handles.
//!
//! Thin wrappers that turn collection operations into [`Command`] proposals
//! against the local node and read back through its applied state machine.
//!
//! [`Command`]: crate::protocol::Command

mod collections;

pub use collections::*;
