//! StateMachine
//!
//! Handles all database-related operations including:
//! - Applying committed log entries to the durable key-value store
//! - Tracking the last applied index so restarts never re-apply entries
//! - Serving reads for client-facing lookups

#[cfg(test)]
use mockall::automock;

use crate::protocol::Entry;
use crate::Result;

#[cfg_attr(test, automock)]
pub trait StateMachine: Send + Sync + 'static {
    fn get(
        &self,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>>;

    /// Applies committed entries in log order.
    ///
    /// Entries at or below the recorded last applied index are skipped, so
    /// re-delivery after a crash is harmless. Each applied chunk advances the
    /// last applied marker atomically with the data it wrote.
    fn apply_batch(
        &self,
        chunk: Vec<Entry>,
    ) -> Result<()>;

    /// Index of the last entry applied to this state machine
    fn last_applied(&self) -> u64;

    /// NOTE: This method may degrade system performance. Use with caution.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush(&self) -> Result<()>;
}
