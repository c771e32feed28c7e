//! Shared helpers for unit tests: a loopback transport, a fully mocked
//! `TypeConfig`, and builders for log entries and contexts.
//!
//! Everything in here is `cfg(test)` only and never ships in the library.

mod channel_transport;
mod common;
pub mod mock_type_config;

pub use channel_transport::*;
pub use common::*;
pub use mock_type_config::*;
