use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::schedule::RateSchedule;

/// Emits arrival instants for an open-model schedule.
///
/// Each tick sleeps until the exact instant the cumulative-arrival integral
/// crosses the next whole arrival, so lateness on one tick never shifts the
/// instants of later ones. If the loop falls behind (slow dispatch, a paused
/// runtime), overdue ticks fire back to back until the clock has caught up.
#[derive(Debug)]
pub struct ArrivalClock {
    schedule: Arc<RateSchedule>,
    origin: Instant,
    dispatched: u64,
}

impl ArrivalClock {
    /// Anchors the schedule's t=0 at the current instant.
    pub fn start(schedule: Arc<RateSchedule>) -> Self {
        Self {
            schedule,
            origin: Instant::now(),
            dispatched: 0,
        }
    }

    /// Waits for the next scheduled arrival and returns its 1-based ordinal,
    /// or `None` once the schedule is exhausted.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the ordinal
    /// undispatched, and the next call waits for the same arrival.
    pub async fn tick(&mut self) -> Option<u64> {
        let n = self.dispatched + 1;
        let offset = self.schedule.time_of_arrival(n as f64)?;
        tokio::time::sleep_until(self.origin + offset).await;
        self.dispatched = n;
        Some(n)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}
