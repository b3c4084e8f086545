pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid scenario descriptor. Fatal at configuration time; the scenario never runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("`stages` must be a non-empty list of {{ target, duration }}")]
    EmptyStages,

    #[error("total schedule duration must be positive")]
    ZeroTotalDuration,

    #[error("`startRate` must be a finite, non-negative rate (got {0})")]
    InvalidStartRate(f64),

    #[error("stage {index}: `target` must be a finite, non-negative rate (got {rate})")]
    InvalidStageRate { index: usize, rate: f64 },

    #[error("`timeUnit` must be a positive duration")]
    InvalidTimeUnit,

    #[error("`maxVUs` must be a positive integer")]
    InvalidMaxVus,

    #[error("`maxVUs` must be >= `preAllocatedVUs` (got {max_vus} < {pre_allocated_vus})")]
    MaxBelowPreAllocated {
        pre_allocated_vus: usize,
        max_vus: usize,
    },

    #[error("smoke profile runs a single virtual user (got vus={0})")]
    InvalidSmokeVus(u64),

    #[error("`duration` must be a positive duration")]
    InvalidDuration,
}
