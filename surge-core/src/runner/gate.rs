use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Decides whether the next closed-loop iteration may start, based on a wall
/// deadline and an optional iteration cap.
#[derive(Debug)]
pub struct IterationGate {
    counter: AtomicU64,
    iterations: Option<u64>,
    duration: Duration,
    deadline: OnceLock<Instant>,
}

impl IterationGate {
    pub fn new(duration: Duration, iterations: Option<u64>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            iterations,
            duration,
            deadline: OnceLock::new(),
        }
    }

    pub fn start_at(&self, started: Instant) {
        let _ = self.deadline.set(started + self.duration);
    }

    pub fn started(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// True if another iteration may start now. Counts the grant.
    pub fn next(&self) -> bool {
        let now = Instant::now();

        // Lazily anchor the deadline to the first observed iteration if the
        // runner never called start_at.
        if self.deadline.get().is_none() {
            self.start_at(now);
        }

        if let Some(deadline) = self.deadline.get()
            && now >= *deadline
        {
            return false;
        }

        if let Some(total) = self.iterations {
            // Count only granted iterations; a refusal must not inflate
            // started().
            return self
                .counter
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                    (n < total).then_some(n + 1)
                })
                .is_ok();
        }

        self.counter.fetch_add(1, Ordering::Relaxed);
        true
    }
}
