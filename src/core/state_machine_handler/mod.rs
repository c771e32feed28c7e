//! The `StateMachineHandler` module owns the application of committed log
//! entries to the `StateMachine`.
//!
//! ## Relationship Between `StateMachineHandler` and `StateMachine`
//! The handler tracks which prefix of the log is committed but not yet
//! applied, reads those entries back from the log and hands them to the
//! `StateMachine` in order. The `StateMachine` itself stays a passive
//! key-value store; everything about progress tracking lives here.
//!
//! Commit signals arrive concurrently from the consensus loop, so the
//! pending watermark is a lock-free atomic that only ever moves forward.

mod default_state_machine_handler;
pub(crate) use default_state_machine_handler::*;


use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::alias::ROF;
use crate::Result;
use crate::TypeConfig;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateMachineHandler<T>: Send + Sync + 'static
where T: TypeConfig
{
    /// Raises the pending commit watermark. Entries up to `new_commit` will
    /// be applied by the next `apply_batch` round.
    fn update_pending(
        &self,
        new_commit: u64,
    );

    /// Applies every committed-but-unapplied entry to the state machine,
    /// in log order.
    async fn apply_batch(
        &self,
        raft_log: Arc<ROF<T>>,
    ) -> Result<()>;

    /// Index of the last entry applied to the state machine.
    fn last_applied(&self) -> u64;
}
