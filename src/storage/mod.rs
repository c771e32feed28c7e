mod raft_log;
mod sled_adapter;
mod state_machine;
mod state_storage;

use std::path::Path;

#[doc(hidden)]
pub use raft_log::*;
#[doc(hidden)]
pub use sled_adapter::*;
#[doc(hidden)]
pub use state_machine::*;
#[doc(hidden)]
pub use state_storage::*;
use tracing::debug;
use tracing::warn;

/// Opens the single sled database backing one node.
///
/// Raft log, state machine and hard state live in separate trees of this
/// database so a node directory stays self-contained.
pub fn init_sled_db(
    sled_db_root_path: impl AsRef<Path> + std::fmt::Debug
) -> std::result::Result<sled::Db, std::io::Error> {
    debug!("init_sled_db from path: {:?}", &sled_db_root_path);

    let db_path = sled_db_root_path.as_ref().join("raftcell");

    sled::Config::default()
        .path(&db_path)
        .cache_capacity(10 * 1024 * 1024) //10MB
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!(
                "Try to open DB at this location: {:?} and failed: {:?}",
                db_path, e
            );
            std::io::Error::other(e)
        })
}
