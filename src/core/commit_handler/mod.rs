mod default_commit_handler;
pub use default_commit_handler::*;


// Trait definition of the current module
// -----------------------------------------------------------------------------
// Core model in Raft: CommitHandler Definition
//

use async_trait::async_trait;

use crate::Result;

/// Owns the apply side of the commit pipeline.
///
/// The consensus loop only decides commit indexes; whoever implements this
/// trait consumes those decisions and drives entries into the state machine,
/// on its own task and at its own pace.
#[async_trait]
pub trait CommitHandler: Send + Sync + 'static {
    /// Runs until the shutdown signal fires. Returns `Ok` on a clean stop.
    async fn run(&mut self) -> Result<()>;
}
