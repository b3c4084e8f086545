#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more quality gates failed.
    GatesFailed = 10,

    /// Invalid CLI/descriptor input (bad flags, invalid durations, invalid
    /// scenario YAML, missing base URL).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_report(gates_failed: bool) -> Self {
        if gates_failed {
            Self::GatesFailed
        } else {
            Self::Success
        }
    }
}
