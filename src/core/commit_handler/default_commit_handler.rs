use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;

use super::CommitHandler;
use crate::alias::ROF;
use crate::alias::SMHOF;
use crate::Error;
use crate::Result;
use crate::StateMachineHandler;
use crate::TypeConfig;

/// Applies committed entries to the state machine in batches.
///
/// Commit notifications from the consensus loop accumulate here. A batch is
/// applied once `batch_size_threshold` notifications piled up or when the
/// process interval fires, whichever comes first, so a slow state machine
/// never blocks consensus and an idle cluster still drains its backlog.
pub struct DefaultCommitHandler<T>
where T: TypeConfig
{
    state_machine_handler: Arc<SMHOF<T>>,
    raft_log: Arc<ROF<T>>,
    new_commit_rx: Option<mpsc::UnboundedReceiver<u64>>,
    batch_size_threshold: u64,
    process_interval_ms: u64,
    // Shutdown signal
    shutdown_signal: watch::Receiver<()>,
}

#[async_trait]
impl<T> CommitHandler for DefaultCommitHandler<T>
where T: TypeConfig
{
    async fn run(&mut self) -> Result<()> {
        let mut batch_counter = 0u64;
        let mut interval = self.batch_interval();
        let mut new_commit_rx = self
            .new_commit_rx
            .take()
            .ok_or_else(|| Error::Fatal("commit handler started twice".to_string()))?;
        let mut shutdown_signal = self.shutdown_signal.clone();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_signal.changed() => {
                    info!("[CommitHandler] shutdown signal received");
                    // One last round so nothing already committed stays
                    // unapplied.
                    self.process_batch().await;
                    return Ok(());
                }

                // Commit notifications in real time
                Some(new_commit) = new_commit_rx.recv() => {
                    trace!("[CommitHandler] new commit index: {}", new_commit);
                    self.state_machine_handler.update_pending(new_commit);
                    batch_counter += 1;

                    if batch_counter >= self.batch_size_threshold {
                        self.process_batch().await;
                        batch_counter = 0;
                    }
                }

                // Scheduled batch processing
                _ = interval.tick() => {
                    self.process_batch().await;
                    batch_counter = 0;
                }
            }
        }
    }
}

impl<T> DefaultCommitHandler<T>
where T: TypeConfig
{
    pub fn new(
        state_machine_handler: Arc<SMHOF<T>>,
        raft_log: Arc<ROF<T>>,
        new_commit_rx: mpsc::UnboundedReceiver<u64>,
        batch_size_threshold: u64,
        process_interval_ms: u64,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            state_machine_handler,
            raft_log,
            new_commit_rx: Some(new_commit_rx),
            batch_size_threshold,
            process_interval_ms,
            shutdown_signal,
        }
    }

    async fn process_batch(&self) {
        if let Err(e) = self.state_machine_handler.apply_batch(self.raft_log.clone()).await {
            // The handler keeps its progress marker, the next round retries
            // from the same point.
            error!("[CommitHandler] apply_batch failed: {:?}", e);
        }
    }

    /// If multiple ticks are missed the timer waits for the next full
    /// period instead of firing a burst.
    fn batch_interval(&self) -> tokio::time::Interval {
        let period = Duration::from_millis(self.process_interval_ms);
        debug!("[CommitHandler] process interval: {:?}", period);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}
