use std::time::Duration;

use super::error::ConfigError;

/// One ramp segment: the arrival rate to reach by the end of `duration`,
/// in iterations per `timeUnit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub target: f64,
    pub duration: Duration,
}

/// Open-workload descriptor: arrivals are scheduled from the compiled rate
/// function, independent of whether prior iterations have completed.
#[derive(Debug, Clone)]
pub struct OpenModelSpec {
    pub start_rate: f64,
    pub time_unit: Duration,
    pub stages: Vec<Stage>,
    pub pre_allocated_vus: usize,
    pub max_vus: usize,
}

/// Closed-loop smoke descriptor: a single VU paced by an explicit sleep
/// between iterations, for a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct SmokeSpec {
    pub vus: u64,
    pub duration: Duration,
    pub sleep_between: Duration,
}

#[derive(Debug, Clone)]
pub enum Profile {
    OpenModel(OpenModelSpec),
    Smoke(SmokeSpec),
}

/// Profile kind (the string form used by descriptors/CLI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ProfileKind {
    #[strum(serialize = "open-model", serialize = "ramping-arrival-rate")]
    OpenModel,

    #[strum(serialize = "smoke")]
    Smoke,
}

#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub name: String,
    pub profile: Profile,

    /// How long the drain phase waits for in-flight iterations before
    /// forcibly cancelling them.
    pub drain_grace: Duration,

    /// How long a VU slot above the preallocated floor may sit idle before
    /// the pool discards it.
    pub idle_grace: Duration,
}

impl ScenarioSpec {
    pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(5);
    pub const DEFAULT_IDLE_GRACE: Duration = Duration::from_secs(10);

    pub fn open_model(name: impl Into<String>, spec: OpenModelSpec) -> Self {
        Self {
            name: name.into(),
            profile: Profile::OpenModel(spec),
            drain_grace: Self::DEFAULT_DRAIN_GRACE,
            idle_grace: Self::DEFAULT_IDLE_GRACE,
        }
    }

    pub fn smoke(name: impl Into<String>, spec: SmokeSpec) -> Self {
        Self {
            name: name.into(),
            profile: Profile::Smoke(spec),
            drain_grace: Self::DEFAULT_DRAIN_GRACE,
            idle_grace: Self::DEFAULT_IDLE_GRACE,
        }
    }

    #[must_use]
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    #[must_use]
    pub fn with_idle_grace(mut self, grace: Duration) -> Self {
        self.idle_grace = grace;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.profile {
            Profile::OpenModel(spec) => validate_open_model(spec),
            Profile::Smoke(spec) => validate_smoke(spec),
        }
    }
}

pub(crate) fn validate_open_model(spec: &OpenModelSpec) -> Result<(), ConfigError> {
    if !spec.start_rate.is_finite() || spec.start_rate < 0.0 {
        return Err(ConfigError::InvalidStartRate(spec.start_rate));
    }

    if spec.time_unit.is_zero() {
        return Err(ConfigError::InvalidTimeUnit);
    }

    if spec.stages.is_empty() {
        return Err(ConfigError::EmptyStages);
    }

    for (index, stage) in spec.stages.iter().enumerate() {
        if !stage.target.is_finite() || stage.target < 0.0 {
            return Err(ConfigError::InvalidStageRate {
                index,
                rate: stage.target,
            });
        }
    }

    let total = spec
        .stages
        .iter()
        .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration));
    if total.is_zero() {
        return Err(ConfigError::ZeroTotalDuration);
    }

    if spec.max_vus == 0 {
        return Err(ConfigError::InvalidMaxVus);
    }

    if spec.pre_allocated_vus > spec.max_vus {
        return Err(ConfigError::MaxBelowPreAllocated {
            pre_allocated_vus: spec.pre_allocated_vus,
            max_vus: spec.max_vus,
        });
    }

    Ok(())
}

fn validate_smoke(spec: &SmokeSpec) -> Result<(), ConfigError> {
    if spec.vus != 1 {
        return Err(ConfigError::InvalidSmokeVus(spec.vus));
    }
    if spec.duration.is_zero() {
        return Err(ConfigError::InvalidDuration);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_open_model() -> OpenModelSpec {
        OpenModelSpec {
            start_rate: 20.0,
            time_unit: Duration::from_secs(1),
            stages: vec![
                Stage {
                    target: 200.0,
                    duration: Duration::from_secs(45),
                },
                Stage {
                    target: 200.0,
                    duration: Duration::from_secs(120),
                },
                Stage {
                    target: 20.0,
                    duration: Duration::from_secs(60),
                },
            ],
            pre_allocated_vus: 200,
            max_vus: 1000,
        }
    }

    #[test]
    fn valid_spec_passes() {
        let spec = ScenarioSpec::open_model("spike", valid_open_model());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn prealloc_above_max_is_rejected() {
        let mut inner = valid_open_model();
        inner.pre_allocated_vus = 2000;
        let spec = ScenarioSpec::open_model("bad", inner);
        assert_eq!(
            spec.validate(),
            Err(ConfigError::MaxBelowPreAllocated {
                pre_allocated_vus: 2000,
                max_vus: 1000,
            })
        );
    }

    #[test]
    fn empty_stages_are_rejected() {
        let mut inner = valid_open_model();
        inner.stages.clear();
        let spec = ScenarioSpec::open_model("bad", inner);
        assert_eq!(spec.validate(), Err(ConfigError::EmptyStages));
    }

    #[test]
    fn negative_rates_are_rejected() {
        let mut inner = valid_open_model();
        inner.stages[1].target = -5.0;
        let spec = ScenarioSpec::open_model("bad", inner);
        assert_eq!(
            spec.validate(),
            Err(ConfigError::InvalidStageRate {
                index: 1,
                rate: -5.0,
            })
        );

        let mut inner = valid_open_model();
        inner.start_rate = f64::NAN;
        let spec = ScenarioSpec::open_model("bad", inner);
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::InvalidStartRate(_))
        ));
    }

    #[test]
    fn zero_total_duration_is_rejected() {
        let mut inner = valid_open_model();
        for stage in &mut inner.stages {
            stage.duration = Duration::ZERO;
        }
        let spec = ScenarioSpec::open_model("bad", inner);
        assert_eq!(spec.validate(), Err(ConfigError::ZeroTotalDuration));
    }

    #[test]
    fn smoke_requires_single_vu_and_duration() {
        let spec = ScenarioSpec::smoke(
            "smoke",
            SmokeSpec {
                vus: 2,
                duration: Duration::from_secs(20),
                sleep_between: Duration::from_secs(1),
            },
        );
        assert_eq!(spec.validate(), Err(ConfigError::InvalidSmokeVus(2)));

        let spec = ScenarioSpec::smoke(
            "smoke",
            SmokeSpec {
                vus: 1,
                duration: Duration::ZERO,
                sleep_between: Duration::from_secs(1),
            },
        );
        assert_eq!(spec.validate(), Err(ConfigError::InvalidDuration));
    }

    #[test]
    fn profile_kind_parses_aliases() {
        assert_eq!(
            "ramping-arrival-rate".parse::<ProfileKind>(),
            Ok(ProfileKind::OpenModel)
        );
        assert_eq!("open-model".parse::<ProfileKind>(), Ok(ProfileKind::OpenModel));
        assert_eq!("smoke".parse::<ProfileKind>(), Ok(ProfileKind::Smoke));
        assert!("constant-vus".parse::<ProfileKind>().is_err());
    }
}
