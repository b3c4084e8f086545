mod clock;
mod config;
mod error;
mod executor;
mod gate;
mod gates;
mod pool;
mod progress;
mod run;
mod schedule;
mod signal;
mod stats;

pub use clock::ArrivalClock;
pub use config::{OpenModelSpec, Profile, ProfileKind, ScenarioSpec, SmokeSpec, Stage};
pub use error::{ConfigError, Error, Result};
pub use executor::{Check, CheckWithHandle, FetchOutcome, RequestFn, bind_checks, request_fn, run_iteration};
pub use gate::IterationGate;
pub use gates::{GateSet, GateViolation};
pub use pool::{VuGuard, VuPool, VuSlot};
pub use progress::{ProgressFn, ProgressUpdate};
pub use run::{RunPhase, RunReport, ScenarioRun, ScenarioRunner, run_scenario};
pub use schedule::{RateSchedule, StageSnapshot};
pub use signal::CancelFlag;
pub use stats::{
    CheckHandle, CheckSummary, IterationSample, LatencySummary, OutcomeKind, RunStats, RunSummary,
};
