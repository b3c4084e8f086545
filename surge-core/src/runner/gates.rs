use super::stats::RunSummary;

/// Pass/fail criteria evaluated against the final run summary. Ratios are in
/// `[0, 1]`; an unset field is not enforced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateSet {
    /// Upper bound on failed checks over evaluated checks.
    pub max_check_fail_ratio: Option<f64>,

    /// Upper bound on dropped arrivals over dispatched arrivals.
    pub max_dropped_ratio: Option<f64>,

    /// Upper bound on errored iterations (HTTP 4xx/5xx, transport failures,
    /// timeouts, cancellations) over executed iterations.
    pub max_error_ratio: Option<f64>,

    /// Upper bound on overall latency p95, in milliseconds.
    pub max_p95_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateViolation {
    pub gate: String,
    pub limit: f64,
    pub observed: Option<f64>,
}

impl GateSet {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Every violated gate, empty when the run passes. A gate whose observed
    /// value cannot be computed (no samples) counts as violated.
    pub fn evaluate(&self, summary: &RunSummary) -> Vec<GateViolation> {
        let mut out = Vec::new();

        if let Some(limit) = self.max_check_fail_ratio {
            let observed = ratio(summary.checks_failed, summary.checks_total);
            push_if_over("check_fail_ratio", limit, observed, &mut out);
        }

        if let Some(limit) = self.max_dropped_ratio {
            let observed = ratio(summary.dropped_iterations_total, summary.dispatched_total());
            push_if_over("dropped_ratio", limit, observed, &mut out);
        }

        if let Some(limit) = self.max_error_ratio {
            let observed = ratio(summary.error_total(), summary.iterations_total);
            push_if_over("error_ratio", limit, observed, &mut out);
        }

        if let Some(limit) = self.max_p95_ms {
            push_if_over("latency_p95_ms", limit, summary.latency.p95_ms, &mut out);
        }

        out
    }
}

fn ratio(num: u64, den: u64) -> Option<f64> {
    if den == 0 {
        // No samples at all means the gate cannot be shown to hold.
        None
    } else {
        Some(num as f64 / den as f64)
    }
}

fn push_if_over(gate: &str, limit: f64, observed: Option<f64>, out: &mut Vec<GateViolation>) {
    let passed = observed.is_some_and(|v| v <= limit);
    if !passed {
        out.push(GateViolation {
            gate: gate.to_string(),
            limit,
            observed,
        });
    }
}
