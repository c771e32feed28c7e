mod client;
mod config;
mod constants;
mod core;
mod errors;
mod membership;
mod network;
mod node;
mod protocol;
mod storage;
mod type_config;
pub mod utils;

pub use core::*;

pub use client::*;
pub use config::*;
pub use errors::*;
pub use membership::*;
pub use network::*;
pub use node::*;
pub use protocol::*;
pub use storage::*;
pub use type_config::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
