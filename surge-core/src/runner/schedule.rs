use std::time::Duration;

use super::config::{OpenModelSpec, validate_open_model};
use super::error::ConfigError;

const EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_rate: f64,
    pub end_rate: f64,
    pub current_rate: f64,
}

/// A compiled piecewise-linear arrival-rate function of elapsed time.
///
/// Rates are normalized to arrivals per second. `rate_at(0)` equals the
/// descriptor's start rate; within each stage the rate interpolates linearly
/// from the previous stage's target to this stage's target.
#[derive(Debug, Clone)]
pub struct RateSchedule {
    start_rate: f64,
    targets: Vec<f64>,
    cumulative_ends: Vec<Duration>,
    /// Integral of `rate(t)` at each stage end, in arrivals.
    cumulative_arrivals: Vec<f64>,
}

impl RateSchedule {
    pub fn compile(spec: &OpenModelSpec) -> Result<Self, ConfigError> {
        validate_open_model(spec)?;

        let unit = spec.time_unit.as_secs_f64();
        let start_rate = spec.start_rate / unit;
        let targets: Vec<f64> = spec.stages.iter().map(|s| s.target / unit).collect();

        let mut cumulative_ends = Vec::with_capacity(spec.stages.len());
        let mut cumulative_arrivals = Vec::with_capacity(spec.stages.len());
        let mut end_acc = Duration::ZERO;
        let mut arrivals_acc = 0.0f64;

        for (idx, stage) in spec.stages.iter().enumerate() {
            let from = if idx == 0 { start_rate } else { targets[idx - 1] };
            let to = targets[idx];
            let d = stage.duration.as_secs_f64();

            end_acc = end_acc.saturating_add(stage.duration);
            // Trapezoid area of the linear ramp across the stage.
            arrivals_acc += (from + to) * 0.5 * d;

            cumulative_ends.push(end_acc);
            cumulative_arrivals.push(arrivals_acc);
        }

        Ok(Self {
            start_rate,
            targets,
            cumulative_ends,
            cumulative_arrivals,
        })
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Total expected arrivals over the whole schedule.
    pub fn total_arrivals(&self) -> f64 {
        self.cumulative_arrivals.last().copied().unwrap_or(0.0)
    }

    fn stage_index(&self, elapsed: Duration) -> usize {
        match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) => i,
            Err(i) => i.min(self.targets.len().saturating_sub(1)),
        }
    }

    fn stage_bounds(&self, idx: usize) -> (Duration, Duration, f64, f64) {
        let end = self.cumulative_ends[idx];
        let start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        let from = if idx == 0 {
            self.start_rate
        } else {
            self.targets[idx - 1]
        };
        let to = self.targets[idx];
        (start, end, from, to)
    }

    /// Instantaneous rate at `elapsed`, in arrivals per second.
    pub fn rate_at(&self, elapsed: Duration) -> f64 {
        if elapsed.is_zero() {
            return self.start_rate;
        }

        let total = self.total_duration();
        if elapsed >= total {
            return self.targets.last().copied().unwrap_or(self.start_rate);
        }

        let idx = self.stage_index(elapsed);
        let (start, end, from, to) = self.stage_bounds(idx);

        let d = end.saturating_sub(start).as_secs_f64();
        if d <= 0.0 {
            return to;
        }

        let tau = elapsed.saturating_sub(start).as_secs_f64();
        from + (to - from) * (tau / d)
    }

    /// Integral of `rate(t)` over `[0, elapsed]`, clamped to the schedule end.
    pub fn expected_arrivals(&self, elapsed: Duration) -> f64 {
        if self.targets.is_empty() || elapsed.is_zero() {
            return 0.0;
        }

        let total = self.total_duration();
        if elapsed >= total {
            return self.total_arrivals();
        }

        let idx = self.stage_index(elapsed);
        let (start, end, from, to) = self.stage_bounds(idx);
        let base = if idx == 0 {
            0.0
        } else {
            self.cumulative_arrivals[idx - 1]
        };

        let d = end.saturating_sub(start).as_secs_f64();
        if d <= 0.0 {
            return base;
        }

        let tau = elapsed.saturating_sub(start).as_secs_f64();
        let slope = (to - from) / d;
        base + from * tau + 0.5 * slope * tau * tau
    }

    /// The instant at which the cumulative arrival count reaches `n`, or
    /// `None` if the schedule ends first. This is the exact inverse of
    /// `expected_arrivals`, so scheduling from it accumulates no drift.
    /// Zero-rate spans contribute nothing to the integral and are skipped.
    pub fn time_of_arrival(&self, n: f64) -> Option<Duration> {
        if n <= EPS {
            return Some(Duration::ZERO);
        }

        if n > self.total_arrivals() + EPS {
            return None;
        }

        let idx = self
            .cumulative_arrivals
            .partition_point(|&acc| acc < n - EPS);
        if idx >= self.targets.len() {
            return None;
        }

        let (start, end, from, to) = self.stage_bounds(idx);
        let base = if idx == 0 {
            0.0
        } else {
            self.cumulative_arrivals[idx - 1]
        };
        let need = (n - base).max(0.0);

        let d = end.saturating_sub(start).as_secs_f64();
        if d <= 0.0 || need <= EPS {
            return Some(start);
        }

        let slope = (to - from) / d;
        let tau = if slope.abs() < EPS {
            if from <= EPS {
                // Zero-rate stage with a nonzero need cannot be selected by
                // the partition above.
                d
            } else {
                need / from
            }
        } else {
            // Solve from*tau + slope*tau^2/2 = need for the first crossing.
            let disc = (from * from + 2.0 * slope * need).max(0.0);
            (disc.sqrt() - from) / slope
        };

        let tau = tau.clamp(0.0, d);
        Some(start + Duration::from_secs_f64(tau))
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.targets.is_empty() {
            return None;
        }

        let total = self.total_duration();
        let clamped = elapsed.min(total);

        let idx = if clamped >= total {
            self.targets.len().saturating_sub(1)
        } else {
            self.stage_index(clamped)
        };

        let (start, end, from, to) = self.stage_bounds(idx);
        let stage_duration = end.saturating_sub(start);
        let stage_elapsed = clamped.saturating_sub(start);
        let stage_remaining = stage_duration.saturating_sub(stage_elapsed);

        Some(StageSnapshot {
            index: idx,
            count: self.targets.len(),
            stage_elapsed,
            stage_remaining,
            start_rate: from,
            end_rate: to,
            current_rate: self.rate_at(clamped),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::config::Stage;

    fn compile(start_rate: f64, time_unit: Duration, stages: &[(f64, u64)]) -> RateSchedule {
        let spec = OpenModelSpec {
            start_rate,
            time_unit,
            stages: stages
                .iter()
                .map(|&(target, secs)| Stage {
                    target,
                    duration: Duration::from_secs(secs),
                })
                .collect(),
            pre_allocated_vus: 1,
            max_vus: 1,
        };
        match RateSchedule::compile(&spec) {
            Ok(s) => s,
            Err(err) => panic!("compile failed: {err}"),
        }
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn constant_rate_interpolates_flat() {
        let s = compile(10.0, Duration::from_secs(1), &[(10.0, 5)]);
        assert_eq!(s.total_duration(), Duration::from_secs(5));
        assert!((s.rate_at(Duration::ZERO) - 10.0).abs() < 1e-9);
        assert!((s.rate_at(secs(2.5)) - 10.0).abs() < 1e-9);
        assert!((s.expected_arrivals(secs(5.0)) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn ramp_interpolates_linearly() {
        let s = compile(0.0, Duration::from_secs(1), &[(100.0, 10)]);
        assert!((s.rate_at(secs(5.0)) - 50.0).abs() < 1e-9);
        assert!((s.rate_at(secs(10.0)) - 100.0).abs() < 1e-9);
        assert!((s.expected_arrivals(secs(10.0)) - 500.0).abs() < 1e-9);
        assert!((s.expected_arrivals(secs(5.0)) - 125.0).abs() < 1e-9);
    }

    #[test]
    fn time_unit_normalizes_rates() {
        // 60 per minute == 1 per second.
        let s = compile(60.0, Duration::from_secs(60), &[(60.0, 10)]);
        assert!((s.rate_at(secs(3.0)) - 1.0).abs() < 1e-9);
        assert!((s.expected_arrivals(secs(10.0)) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn spike_profile_integral_matches_trapezoids() {
        let s = compile(
            20.0,
            Duration::from_secs(1),
            &[(200.0, 45), (200.0, 120), (20.0, 60)],
        );
        // (20+200)/2*45 + 200*120 + (200+20)/2*60
        assert!((s.total_arrivals() - 35_550.0).abs() < 1e-6);
        assert!((s.expected_arrivals(secs(45.0)) - 4_950.0).abs() < 1e-6);
        assert!((s.expected_arrivals(secs(165.0)) - 28_950.0).abs() < 1e-6);
    }

    #[test]
    fn time_of_arrival_inverts_the_integral() {
        let s = compile(
            20.0,
            Duration::from_secs(1),
            &[(200.0, 45), (200.0, 120), (20.0, 60)],
        );

        for &n in &[1.0, 100.0, 4_950.0, 10_000.0, 28_950.0, 35_549.0] {
            let at = match s.time_of_arrival(n) {
                Some(at) => at,
                None => panic!("expected a time for arrival {n}"),
            };
            let back = s.expected_arrivals(at);
            assert!(
                (back - n).abs() < 1e-4,
                "arrival {n}: inverted to {at:?}, integral {back}"
            );
        }

        assert_eq!(s.time_of_arrival(40_000.0), None);
    }

    #[test]
    fn zero_rate_stage_defers_arrivals() {
        let s = compile(0.0, Duration::from_secs(1), &[(0.0, 2), (10.0, 2)]);
        assert!((s.expected_arrivals(secs(2.0))).abs() < 1e-9);
        assert!((s.total_arrivals() - 10.0).abs() < 1e-9);

        // First arrival lands inside the second stage: solve 2.5*tau^2 = 1.
        let at = match s.time_of_arrival(1.0) {
            Some(at) => at,
            None => panic!("expected a first arrival"),
        };
        let expected = 2.0 + (2.0f64 / 5.0).sqrt();
        assert!((at.as_secs_f64() - expected).abs() < 1e-6);
    }

    #[test]
    fn ramp_down_inversion_stays_within_stage() {
        let s = compile(100.0, Duration::from_secs(1), &[(0.0, 10)]);
        assert!((s.total_arrivals() - 500.0).abs() < 1e-9);

        let at = match s.time_of_arrival(499.0) {
            Some(at) => at,
            None => panic!("expected a time"),
        };
        assert!(at <= s.total_duration());
        assert!((s.expected_arrivals(at) - 499.0).abs() < 1e-6);
    }

    #[test]
    fn snapshot_reports_stage_progress() {
        let s = compile(0.0, Duration::from_secs(1), &[(10.0, 10), (50.0, 10)]);
        let snap = match s.stage_snapshot_at(secs(15.0)) {
            Some(snap) => snap,
            None => panic!("expected a snapshot"),
        };
        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 2);
        assert_eq!(snap.stage_elapsed, secs(5.0));
        assert_eq!(snap.stage_remaining, secs(5.0));
        assert!((snap.start_rate - 10.0).abs() < 1e-9);
        assert!((snap.end_rate - 50.0).abs() < 1e-9);
        assert!((snap.current_rate - 30.0).abs() < 1e-9);
    }
}
