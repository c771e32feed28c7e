use std::time::Duration;

use tokio::time::Instant;

/// Fixed-cadence heartbeat clock for the leader role.
#[derive(Clone, Debug)]
pub struct HeartbeatTimer {
    interval: Duration,
    next_deadline: Instant,
}

impl HeartbeatTimer {
    pub fn new(interval_ms: u64) -> Self {
        let interval = Duration::from_millis(interval_ms);
        Self {
            interval,
            next_deadline: Instant::now() + interval,
        }
    }

    /// Timer whose first tick is already due. A fresh leader uses this to
    /// announce itself without waiting a full heartbeat interval.
    pub fn immediate(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            next_deadline: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        self.next_deadline = Instant::now() + self.interval;
    }

    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    pub fn is_expired(&self) -> bool {
        self.next_deadline <= Instant::now()
    }
}
