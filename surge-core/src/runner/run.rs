use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::clock::ArrivalClock;
use super::config::{OpenModelSpec, Profile, ScenarioSpec, SmokeSpec};
use super::error::Result;
use super::executor::{Check, RequestFn, bind_checks, run_iteration};
use super::gate::IterationGate;
use super::gates::{GateSet, GateViolation};
use super::pool::VuPool;
use super::progress::{ProgressFn, ProgressUpdate};
use super::schedule::RateSchedule;
use super::signal::CancelFlag;
use super::stats::{RunStats, RunSummary};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Scenario lifecycle, published through a watch channel so embedders can
/// observe transitions without polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunPhase {
    Configuring,
    Running,
    Draining,
    Completed,
    Failed,
}

/// A scenario plus everything needed to execute it.
pub struct ScenarioRun {
    pub spec: ScenarioSpec,
    pub request: RequestFn,
    pub checks: Vec<Check>,
    pub gates: GateSet,
    pub progress: Option<ProgressFn>,
}

impl ScenarioRun {
    pub fn new(spec: ScenarioSpec, request: RequestFn) -> Self {
        Self {
            spec,
            request,
            checks: Vec::new(),
            gates: GateSet::default(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_checks(mut self, checks: Vec<Check>) -> Self {
        self.checks = checks;
        self
    }

    #[must_use]
    pub fn with_gates(mut self, gates: GateSet) -> Self {
        self.gates = gates;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub scenario: String,
    pub summary: RunSummary,
    pub violations: Vec<GateViolation>,
    /// True when the run ended on the cancel flag rather than the schedule.
    pub interrupted: bool,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Drives one scenario through its lifecycle.
pub struct ScenarioRunner {
    phase_tx: watch::Sender<RunPhase>,
    cancel: Arc<CancelFlag>,
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self::with_cancel(CancelFlag::new())
    }

    /// Use an externally owned cancel flag (e.g. wired to SIGINT).
    pub fn with_cancel(cancel: Arc<CancelFlag>) -> Self {
        let (phase_tx, _) = watch::channel(RunPhase::Configuring);
        Self { phase_tx, cancel }
    }

    pub fn cancel_flag(&self) -> Arc<CancelFlag> {
        Arc::clone(&self.cancel)
    }

    pub fn phase(&self) -> watch::Receiver<RunPhase> {
        self.phase_tx.subscribe()
    }

    fn set_phase(&self, phase: RunPhase) {
        self.phase_tx.send_replace(phase);
    }

    /// Runs the scenario to completion (schedule exhausted or cancelled),
    /// drains in-flight work, and evaluates quality gates.
    ///
    /// `Err` is reserved for configuration and runtime faults; a run whose
    /// gates fail still returns `Ok` with the violations listed.
    pub async fn run(&self, run: ScenarioRun) -> Result<RunReport> {
        self.set_phase(RunPhase::Configuring);
        if let Err(err) = run.spec.validate() {
            self.set_phase(RunPhase::Failed);
            return Err(err.into());
        }

        let result = match run.spec.profile.clone() {
            Profile::OpenModel(spec) => self.run_open_model(&run, &spec).await,
            Profile::Smoke(spec) => self.run_smoke(&run, &spec).await,
        };

        match result {
            Ok(summary) => {
                let violations = run.gates.evaluate(&summary);
                // A drained run always completes; gate failures are carried
                // by the report, not the phase.
                self.set_phase(RunPhase::Completed);
                Ok(RunReport {
                    scenario: run.spec.name.clone(),
                    summary,
                    violations,
                    interrupted: self.cancel.is_cancelled(),
                })
            }
            Err(err) => {
                self.set_phase(RunPhase::Failed);
                Err(err)
            }
        }
    }

    async fn run_open_model(&self, run: &ScenarioRun, spec: &OpenModelSpec) -> Result<RunSummary> {
        let schedule = Arc::new(RateSchedule::compile(spec)?);
        let pool = Arc::new(VuPool::new(
            spec.pre_allocated_vus,
            spec.max_vus,
            run.spec.idle_grace,
        ));
        let stats = Arc::new(RunStats::default());
        let checks = bind_checks(&run.checks, &stats);

        self.set_phase(RunPhase::Running);

        let started = Instant::now();
        let mut clock = ArrivalClock::start(Arc::clone(&schedule));
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut progress = tokio::time::interval(PROGRESS_INTERVAL);
        progress.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                arrival = clock.tick() => {
                    if arrival.is_none() {
                        break;
                    }
                    match pool.acquire_guard() {
                        Some(guard) => {
                            let request = Arc::clone(&run.request);
                            let checks = checks.clone();
                            let stats = Arc::clone(&stats);
                            tasks.spawn(async move {
                                run_iteration(&request, &checks, &stats).await;
                                drop(guard);
                            });
                        }
                        // An arrival with no free slot is shed, not queued.
                        None => stats.record_dropped_iterations(1),
                    }
                }
                _ = self.cancel.cancelled() => break,
                _ = progress.tick() => {
                    self.emit_progress(run, started.elapsed(), Some(&schedule), &pool, &stats);
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(err) = joined
                        && !err.is_cancelled()
                    {
                        return Err(err.into());
                    }
                }
            }
        }

        self.set_phase(RunPhase::Draining);
        self.drain(run, &mut tasks, &stats).await?;
        self.emit_progress(run, started.elapsed(), Some(&schedule), &pool, &stats);

        Ok(stats.snapshot(started.elapsed()))
    }

    async fn run_smoke(&self, run: &ScenarioRun, spec: &SmokeSpec) -> Result<RunSummary> {
        let pool = Arc::new(VuPool::new(
            spec.vus as usize,
            spec.vus as usize,
            run.spec.idle_grace,
        ));
        let stats = Arc::new(RunStats::default());
        let checks = bind_checks(&run.checks, &stats);
        let gate = IterationGate::new(spec.duration, None);

        self.set_phase(RunPhase::Running);

        let started = Instant::now();
        gate.start_at(started);

        while gate.next() && !self.cancel.is_cancelled() {
            {
                // A single closed-loop VU: the slot is always available here.
                let _guard = pool.acquire_guard();
                run_iteration(&run.request, &checks, &stats).await;
            }
            self.emit_progress(run, started.elapsed(), None, &pool, &stats);

            tokio::select! {
                _ = tokio::time::sleep(spec.sleep_between) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        self.set_phase(RunPhase::Draining);

        Ok(stats.snapshot(started.elapsed()))
    }

    /// Waits for in-flight iterations up to the drain grace, then aborts the
    /// stragglers and accounts for them as cancelled error samples.
    async fn drain(&self, run: &ScenarioRun, tasks: &mut JoinSet<()>, stats: &RunStats) -> Result<()> {
        let graceful = tokio::time::timeout(run.spec.drain_grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined
                    && !err.is_cancelled()
                {
                    return Err(super::error::Error::from(err));
                }
            }
            Ok(())
        })
        .await;

        match graceful {
            Ok(res) => res?,
            Err(_elapsed) => {
                tasks.abort_all();
                while let Some(joined) = tasks.join_next().await {
                    match joined {
                        Ok(()) => {}
                        Err(err) if err.is_cancelled() => stats.record_cancelled_iteration(),
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }

        Ok(())
    }

    fn emit_progress(
        &self,
        run: &ScenarioRun,
        elapsed: Duration,
        schedule: Option<&RateSchedule>,
        pool: &VuPool,
        stats: &RunStats,
    ) {
        let Some(progress) = &run.progress else {
            return;
        };

        let (window_p50_ms, window_p95_ms) = stats.take_latency_window_ms();
        progress(&ProgressUpdate {
            phase: *self.phase_tx.borrow(),
            elapsed,
            stage: schedule.and_then(|s| s.stage_snapshot_at(elapsed)),
            iterations_total: stats.iterations_total(),
            dropped_total: stats.dropped_iterations_total(),
            in_use_vus: pool.in_use(),
            live_vus: pool.live(),
            window_p50_ms,
            window_p95_ms,
        });
    }
}

/// Convenience for binaries: build a runner, wire nothing, run once.
pub async fn run_scenario(run: ScenarioRun) -> Result<RunReport> {
    ScenarioRunner::new().run(run).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{self, HttpResponse};
    use crate::runner::config::Stage;
    use bytes::Bytes;

    fn instant_ok() -> RequestFn {
        Arc::new(|| {
            Box::pin(async {
                Ok(HttpResponse {
                    status: 200,
                    body: Bytes::from_static(b"{\"status\":\"ok\"}"),
                })
            })
        })
    }

    fn slow_ok(delay: Duration) -> RequestFn {
        Arc::new(move || {
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(HttpResponse {
                    status: 200,
                    body: Bytes::new(),
                })
            })
        })
    }

    fn open_model_spec(
        start_rate: f64,
        stages: &[(f64, u64)],
        pre_allocated: usize,
        max: usize,
    ) -> ScenarioSpec {
        ScenarioSpec::open_model(
            "test",
            OpenModelSpec {
                start_rate,
                time_unit: Duration::from_secs(1),
                stages: stages
                    .iter()
                    .map(|&(target, secs)| Stage {
                        target,
                        duration: Duration::from_secs(secs),
                    })
                    .collect(),
                pre_allocated_vus: pre_allocated,
                max_vus: max,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn open_model_executes_every_scheduled_arrival() {
        let spec = open_model_spec(10.0, &[(10.0, 2)], 4, 8);
        let runner = ScenarioRunner::new();
        let report = match runner.run(ScenarioRun::new(spec, instant_ok())).await {
            Ok(report) => report,
            Err(err) => panic!("run failed: {err}"),
        };

        assert_eq!(report.summary.iterations_total, 20);
        assert_eq!(report.summary.dropped_iterations_total, 0);
        assert_eq!(report.summary.status_2xx, 20);
        assert!(!report.interrupted);
        assert!(report.passed());
        assert_eq!(*runner.phase().borrow(), RunPhase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_sheds_arrivals_and_drain_cancels_stragglers() {
        // One slot, responses slower than the whole schedule: the first
        // arrival occupies the pool and the other nine are shed.
        let spec = open_model_spec(10.0, &[(10.0, 1)], 1, 1).with_drain_grace(Duration::from_secs(1));
        let runner = ScenarioRunner::new();
        let report = match runner
            .run(ScenarioRun::new(spec, slow_ok(Duration::from_secs(60))))
            .await
        {
            Ok(report) => report,
            Err(err) => panic!("run failed: {err}"),
        };

        assert_eq!(report.summary.dropped_iterations_total, 9);
        assert_eq!(report.summary.cancelled_total, 1);
        assert_eq!(report.summary.iterations_total, 1);
        assert_eq!(report.summary.dispatched_total(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_schedule_early() {
        let spec = open_model_spec(1.0, &[(1.0, 60)], 1, 2);
        let runner = Arc::new(ScenarioRunner::new());
        let cancel = runner.cancel_flag();

        let handle = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run(ScenarioRun::new(spec, instant_ok())).await })
        };

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        cancel.cancel();

        let report = match handle.await {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => panic!("run failed: {err}"),
            Err(err) => panic!("join failed: {err}"),
        };

        assert!(report.interrupted);
        assert_eq!(report.summary.iterations_total, 5);
        assert_eq!(*runner.phase().borrow(), RunPhase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn smoke_paces_one_iteration_per_sleep() {
        let spec = ScenarioSpec::smoke(
            "smoke",
            SmokeSpec {
                vus: 1,
                duration: Duration::from_secs(20),
                sleep_between: Duration::from_secs(1),
            },
        );
        let runner = ScenarioRunner::new();
        let report = match runner.run(ScenarioRun::new(spec, instant_ok())).await {
            Ok(report) => report,
            Err(err) => panic!("run failed: {err}"),
        };

        assert!(
            (18..=20).contains(&report.summary.iterations_total),
            "got {} iterations",
            report.summary.iterations_total
        );
        assert_eq!(report.summary.dropped_iterations_total, 0);
        assert!(!report.interrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_gates_fail_the_report_but_complete_the_run() {
        let spec = open_model_spec(5.0, &[(5.0, 1)], 2, 2);
        let gates = GateSet {
            max_error_ratio: Some(0.0),
            ..GateSet::default()
        };
        let request: RequestFn = Arc::new(|| {
            Box::pin(async {
                Err(http::Error::Timeout(Duration::from_millis(10)))
            })
        });

        let runner = ScenarioRunner::new();
        let report = match runner
            .run(ScenarioRun::new(spec, request).with_gates(gates))
            .await
        {
            Ok(report) => report,
            Err(err) => panic!("run failed: {err}"),
        };

        assert!(!report.passed());
        assert_eq!(report.violations[0].gate, "error_ratio");
        // The run drained and produced a report; only config/runtime faults
        // reach the Failed phase.
        assert_eq!(*runner.phase().borrow(), RunPhase::Completed);
    }

    #[tokio::test]
    async fn invalid_spec_fails_during_configuration() {
        let spec = open_model_spec(5.0, &[], 2, 2);
        let runner = ScenarioRunner::new();
        let err = match runner.run(ScenarioRun::new(spec, instant_ok())).await {
            Ok(_) => panic!("expected a configuration error"),
            Err(err) => err,
        };

        assert!(matches!(
            err,
            super::super::error::Error::Config(super::super::error::ConfigError::EmptyStages)
        ));
        assert_eq!(*runner.phase().borrow(), RunPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn checks_are_evaluated_per_iteration() {
        let spec = open_model_spec(5.0, &[(5.0, 1)], 2, 4);
        let checks = vec![Check::status_is(200), Check::body_contains("nope")];

        let report = match run_scenario(ScenarioRun::new(spec, instant_ok()).with_checks(checks))
            .await
        {
            Ok(report) => report,
            Err(err) => panic!("run failed: {err}"),
        };

        assert_eq!(report.summary.checks_total, 10);
        assert_eq!(report.summary.checks_failed, 5);
        assert_eq!(report.summary.checks_by_name.len(), 2);
    }
}
