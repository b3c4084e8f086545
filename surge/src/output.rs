use crate::cli::OutputFormat;
use std::path::Path;
use surge_core::runner::{ProgressFn, RunReport, ScenarioSpec};

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, source: &Path, spec: &ScenarioSpec);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_report(&self, report: &RunReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
