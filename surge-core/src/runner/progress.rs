use std::sync::Arc;
use std::time::Duration;

use super::run::RunPhase;
use super::schedule::StageSnapshot;

/// Point-in-time progress observation, emitted roughly once per second while
/// a scenario runs.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub phase: RunPhase,
    pub elapsed: Duration,
    pub stage: Option<StageSnapshot>,
    pub iterations_total: u64,
    pub dropped_total: u64,
    pub in_use_vus: usize,
    pub live_vus: usize,
    pub window_p50_ms: Option<f64>,
    pub window_p95_ms: Option<f64>,
}

pub type ProgressFn = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;
