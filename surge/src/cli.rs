use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60)
                .and_then(|v| v.checked_mul(60))
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// JSON progress and summary lines (NDJSON) on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Open-workload HTTP load generator",
    long_about = "surge drives HTTP traffic at a target service using an open workload: arrivals follow a compiled rate schedule rather than waiting for prior responses.\n\nA scenario YAML descriptor declares the profile (ramping arrival rate or single-user smoke), the request to replay, declarative checks, and quality gates.\n\nRelative request paths resolve against BASE_URL (or --base-url).",
    after_help = "Examples:\n  surge run scenarios/smoke.yaml --base-url http://localhost:8000\n  surge run scenarios/spike.yaml --output json\n  BASE_URL=http://localhost:8000 surge smoke /health"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario descriptor
    #[command(
        long_about = "Run a YAML scenario descriptor.\n\nCLI flags override values from the descriptor."
    )]
    Run(RunArgs),

    /// Single-VU smoke loop against one path or URL
    Smoke(SmokeArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the scenario descriptor (.yaml)
    pub scenario: PathBuf,

    /// Base URL relative request paths resolve against
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// Override the scenario duration (smoke profile only)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct SmokeArgs {
    /// Path (resolved against BASE_URL) or absolute http:// URL
    pub target: String,

    /// Base URL relative paths resolve against
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    /// How long to keep iterating
    #[arg(long, value_parser = parse_duration, default_value = "20s")]
    pub duration: Duration,

    /// Pause between iterations
    #[arg(long, value_parser = parse_duration, default_value = "1s")]
    pub sleep: Duration,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn cli_parses_run_args() {
        let parsed = Cli::try_parse_from([
            "surge",
            "run",
            "scenarios/spike.yaml",
            "--base-url",
            "http://localhost:8000",
            "--output",
            "json",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.scenario, PathBuf::from("scenarios/spike.yaml"));
                assert_eq!(args.base_url.as_deref(), Some("http://localhost:8000"));
                assert!(args.duration.is_none());
                assert!(matches!(args.output, OutputFormat::Json));
            }
            Command::Smoke(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_parses_smoke_defaults() {
        let parsed = Cli::try_parse_from(["surge", "smoke", "/health"]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Smoke(args) => {
                assert_eq!(args.target, "/health");
                assert_eq!(args.duration, Duration::from_secs(20));
                assert_eq!(args.sleep, Duration::from_secs(1));
            }
            Command::Run(_) => panic!("expected smoke command"),
        }
    }
}
