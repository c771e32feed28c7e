// Submodule declaration
// -----------------------------------------------------------------------------
mod sled_raft_log;
mod sled_state_machine;
mod sled_state_storage;


// Re-export
// -----------------------------------------------------------------------------
pub use sled_raft_log::*;
pub use sled_state_machine::*;
pub use sled_state_storage::*;
