use hdrhistogram::Histogram;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::http::TransportErrorKind;

/// How a finished iteration is classified in the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    HttpError,
    TransportError,
    Timeout,
    Cancelled,
}

/// Per-iteration sample handed to the aggregator.
#[derive(Debug, Clone, Copy)]
pub struct IterationSample {
    pub status: Option<u16>,
    pub transport_error_kind: Option<TransportErrorKind>,
    pub latency: Duration,
}

impl IterationSample {
    pub fn outcome_kind(&self) -> OutcomeKind {
        match (self.transport_error_kind, self.status) {
            (Some(TransportErrorKind::Timeout), _) => OutcomeKind::Timeout,
            (Some(_), _) => OutcomeKind::TransportError,
            (None, Some(status)) if status >= 400 => OutcomeKind::HttpError,
            (None, Some(_)) => OutcomeKind::Success,
            (None, None) => OutcomeKind::TransportError,
        }
    }
}

#[derive(Debug, Default)]
struct CheckCounters {
    total: AtomicU64,
    failed: AtomicU64,
}

/// Pre-resolved handle for one named check, so the per-iteration hot path
/// never touches the name map.
#[derive(Debug, Clone)]
pub struct CheckHandle {
    counters: Arc<CheckCounters>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub total: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LatencySummary {
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub mean_ms: Option<f64>,
    pub max_ms: Option<u64>,
    pub count: u64,
}

/// Point-in-time aggregated view of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub iterations_total: u64,
    pub dropped_iterations_total: u64,
    pub status_2xx: u64,
    pub status_3xx: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
    pub transport_errors_total: u64,
    pub timeouts_total: u64,
    pub cancelled_total: u64,
    pub checks_total: u64,
    pub checks_failed: u64,
    pub checks_by_name: Vec<CheckSummary>,
    pub latency: LatencySummary,
    pub run_duration: Duration,
    pub iterations_per_sec: f64,
}

impl RunSummary {
    /// Arrivals the clock produced: executed iterations plus drops.
    pub fn dispatched_total(&self) -> u64 {
        self.iterations_total
            .saturating_add(self.dropped_iterations_total)
    }

    pub fn error_total(&self) -> u64 {
        self.status_4xx
            .saturating_add(self.status_5xx)
            .saturating_add(self.transport_errors_total)
            .saturating_add(self.timeouts_total)
            .saturating_add(self.cancelled_total)
    }
}

/// Thread-safe run aggregator: lock-free counters plus a mutex-guarded
/// latency histogram. `record_*` is amortized O(1); `snapshot` takes each
/// lock once and never holds one across an await.
#[derive(Debug)]
pub struct RunStats {
    iterations_total: AtomicU64,
    dropped_iterations_total: AtomicU64,
    status_2xx: AtomicU64,
    status_3xx: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,
    transport_errors_total: AtomicU64,
    timeouts_total: AtomicU64,
    cancelled_total: AtomicU64,
    checks_total: AtomicU64,
    checks_failed: AtomicU64,
    checks_by_name: Mutex<HashMap<Arc<str>, Arc<CheckCounters>>>,
    latency_us: Mutex<Histogram<u64>>,
    latency_us_window: Mutex<Histogram<u64>>,
}

impl Default for RunStats {
    fn default() -> Self {
        fn new_hist() -> Histogram<u64> {
            // Track up to 60s in microseconds (with 3 sigfigs).
            Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)
                .unwrap_or_else(|err| panic!("failed to init histogram: {err}"))
        }

        Self {
            iterations_total: AtomicU64::new(0),
            dropped_iterations_total: AtomicU64::new(0),
            status_2xx: AtomicU64::new(0),
            status_3xx: AtomicU64::new(0),
            status_4xx: AtomicU64::new(0),
            status_5xx: AtomicU64::new(0),
            transport_errors_total: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
            cancelled_total: AtomicU64::new(0),
            checks_total: AtomicU64::new(0),
            checks_failed: AtomicU64::new(0),
            checks_by_name: Mutex::new(HashMap::new()),
            latency_us: Mutex::new(new_hist()),
            latency_us_window: Mutex::new(new_hist()),
        }
    }
}

impl RunStats {
    pub fn iterations_total(&self) -> u64 {
        self.iterations_total.load(Ordering::Relaxed)
    }

    pub fn dropped_iterations_total(&self) -> u64 {
        self.dropped_iterations_total.load(Ordering::Relaxed)
    }

    pub fn checks_failed_total(&self) -> u64 {
        self.checks_failed.load(Ordering::Relaxed)
    }

    pub fn record_iteration(&self, sample: IterationSample) {
        self.iterations_total.fetch_add(1, Ordering::Relaxed);

        match sample.outcome_kind() {
            OutcomeKind::Success | OutcomeKind::HttpError => {
                match sample.status.unwrap_or(0) {
                    200..=299 => {
                        self.status_2xx.fetch_add(1, Ordering::Relaxed);
                    }
                    300..=399 => {
                        self.status_3xx.fetch_add(1, Ordering::Relaxed);
                    }
                    400..=499 => {
                        self.status_4xx.fetch_add(1, Ordering::Relaxed);
                    }
                    500..=599 => {
                        self.status_5xx.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
            }
            OutcomeKind::Timeout => {
                self.timeouts_total.fetch_add(1, Ordering::Relaxed);
            }
            OutcomeKind::TransportError => {
                self.transport_errors_total.fetch_add(1, Ordering::Relaxed);
            }
            OutcomeKind::Cancelled => {
                self.cancelled_total.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.record_latency(sample.latency);
    }

    /// An arrival that found no VU slot. Never fatal.
    pub fn record_dropped_iterations(&self, n: u64) {
        if n != 0 {
            self.dropped_iterations_total
                .fetch_add(n, Ordering::Relaxed);
        }
    }

    /// An in-flight iteration forcibly cancelled during drain. Counted as an
    /// executed iteration with an error outcome; no latency is recorded.
    pub fn record_cancelled_iteration(&self) {
        self.iterations_total.fetch_add(1, Ordering::Relaxed);
        self.cancelled_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn check_handle(&self, name: &str) -> CheckHandle {
        let counters = {
            let mut map = self
                .checks_by_name
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(v) = map.get(name) {
                v.clone()
            } else {
                let key: Arc<str> = Arc::from(name);
                let v = Arc::new(CheckCounters::default());
                map.insert(key, v.clone());
                v
            }
        };

        CheckHandle { counters }
    }

    pub fn record_check(&self, handle: &CheckHandle, ok: bool) {
        self.checks_total.fetch_add(1, Ordering::Relaxed);
        handle.counters.total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.checks_failed.fetch_add(1, Ordering::Relaxed);
            handle.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_latency(&self, latency: Duration) {
        let us = latency.as_micros();
        if us == 0 {
            return;
        }
        let value = us.min(u64::MAX as u128) as u64;

        {
            let mut h = self
                .latency_us
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = h.record(value);
        }

        {
            let mut h = self
                .latency_us_window
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = h.record(value);
        }
    }

    /// Drain the short-window histogram, returning (p50, p95) in ms.
    pub fn take_latency_window_ms(&self) -> (Option<f64>, Option<f64>) {
        let mut h = self
            .latency_us_window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let out = if h.is_empty() {
            (None, None)
        } else {
            let p50 = h.value_at_quantile(0.50) as f64 / 1000.0;
            let p95 = h.value_at_quantile(0.95) as f64 / 1000.0;
            (Some(p50), Some(p95))
        };

        h.reset();
        out
    }

    pub fn snapshot(&self, elapsed: Duration) -> RunSummary {
        let iterations_total = self.iterations_total.load(Ordering::Relaxed);
        let secs = elapsed.as_secs_f64().max(1e-9);

        let checks_by_name = {
            let map = self
                .checks_by_name
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut out = Vec::with_capacity(map.len());
            for (name, counters) in map.iter() {
                out.push(CheckSummary {
                    name: name.to_string(),
                    total: counters.total.load(Ordering::Relaxed),
                    failed: counters.failed.load(Ordering::Relaxed),
                });
            }
            out.sort_by(|a, b| a.name.cmp(&b.name));
            out
        };

        let latency = {
            let h = self
                .latency_us
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if h.is_empty() {
                LatencySummary::default()
            } else {
                LatencySummary {
                    p50_ms: Some(h.value_at_quantile(0.50) as f64 / 1000.0),
                    p95_ms: Some(h.value_at_quantile(0.95) as f64 / 1000.0),
                    p99_ms: Some(h.value_at_quantile(0.99) as f64 / 1000.0),
                    mean_ms: Some(h.mean() / 1000.0),
                    max_ms: Some(h.max() / 1000),
                    count: h.len(),
                }
            }
        };

        RunSummary {
            iterations_total,
            dropped_iterations_total: self.dropped_iterations_total.load(Ordering::Relaxed),
            status_2xx: self.status_2xx.load(Ordering::Relaxed),
            status_3xx: self.status_3xx.load(Ordering::Relaxed),
            status_4xx: self.status_4xx.load(Ordering::Relaxed),
            status_5xx: self.status_5xx.load(Ordering::Relaxed),
            transport_errors_total: self.transport_errors_total.load(Ordering::Relaxed),
            timeouts_total: self.timeouts_total.load(Ordering::Relaxed),
            cancelled_total: self.cancelled_total.load(Ordering::Relaxed),
            checks_total: self.checks_total.load(Ordering::Relaxed),
            checks_failed: self.checks_failed.load(Ordering::Relaxed),
            checks_by_name,
            latency,
            run_duration: elapsed,
            iterations_per_sec: (iterations_total as f64) / secs,
        }
    }
}
