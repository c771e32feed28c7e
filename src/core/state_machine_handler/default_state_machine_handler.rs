use std::ops::RangeInclusive;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::StateMachineHandler;
use crate::alias::ROF;
use crate::alias::SMOF;
use crate::storage::RaftLog;
use crate::storage::StateMachine;
use crate::Result;
use crate::TypeConfig;

pub struct DefaultStateMachineHandler<T>
where T: TypeConfig
{
    /// The last applied log index. Mirrors the state machine's own durable
    /// marker so the pending range is computed without touching storage.
    last_applied: AtomicU64,

    /// The highest commit index announced so far
    pending_commit: AtomicU64,

    state_machine: Arc<SMOF<T>>,
}

#[async_trait]
impl<T> StateMachineHandler<T> for DefaultStateMachineHandler<T>
where T: TypeConfig
{
    fn update_pending(
        &self,
        new_commit: u64,
    ) {
        let mut current = self.pending_commit.load(Ordering::Acquire);
        while new_commit > current {
            match self.pending_commit.compare_exchange_weak(
                current,
                new_commit,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Applies the committed backlog in one ordered batch.
    ///
    /// `last_applied` only advances after the state machine accepted the
    /// whole batch, so a failed round is retried from the same point.
    async fn apply_batch(
        &self,
        raft_log: Arc<ROF<T>>,
    ) -> Result<()> {
        if let Some(range) = self.pending_range() {
            let range_end = *range.end();
            let entries = raft_log.get_entries_between(range);
            debug!(
                "apply_batch: {} entr(ies) up to index {}",
                entries.len(),
                range_end
            );

            self.state_machine.apply_batch(entries)?;

            self.last_applied.store(range_end, Ordering::Release);
        }
        Ok(())
    }

    fn last_applied(&self) -> u64 {
        self.last_applied.load(Ordering::Acquire)
    }
}

impl<T> DefaultStateMachineHandler<T>
where T: TypeConfig
{
    pub fn new(
        last_applied: Option<u64>,
        state_machine: Arc<SMOF<T>>,
    ) -> Self {
        Self {
            last_applied: AtomicU64::new(last_applied.unwrap_or(0)),
            pending_commit: AtomicU64::new(0),
            state_machine,
        }
    }

    /// The committed range still waiting to be applied
    pub fn pending_range(&self) -> Option<RangeInclusive<u64>> {
        let last_applied = self.last_applied.load(Ordering::Acquire);
        let pending_commit = self.pending_commit.load(Ordering::Acquire);

        if pending_commit > last_applied {
            Some((last_applied + 1)..=pending_commit)
        } else {
            None
        }
    }

    #[cfg(test)]
    pub fn pending_commit(&self) -> u64 {
        self.pending_commit.load(Ordering::Acquire)
    }
}
