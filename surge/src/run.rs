use anyhow::Context as _;
use std::path::Path;
use std::time::Duration;

use surge_core::runner::{
    Check, Profile, RequestFn, ScenarioRun, ScenarioRunner, ScenarioSpec, SmokeSpec, request_fn,
};
use surge_core::{HttpClient, HttpRequest};

use crate::cli::{RunArgs, SmokeArgs};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::scenario_yaml::{self, RequestYaml};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let loaded = scenario_yaml::load_scenario_from_yaml(&args.scenario)
        .await
        .map_err(RunError::InvalidInput)?;

    let mut spec = loaded.spec;
    if let Some(duration) = args.duration {
        match &mut spec.profile {
            Profile::Smoke(s) => s.duration = duration,
            Profile::OpenModel(_) => {
                return Err(RunError::InvalidInput(anyhow::anyhow!(
                    "--duration only applies to the smoke profile; edit the stages instead"
                )));
            }
        }
    }

    let request = build_request(args.base_url.as_deref(), &loaded.request)
        .map_err(RunError::InvalidInput)?;

    execute(
        &args.scenario,
        args.output,
        spec,
        request,
        loaded.checks,
        loaded.gates,
    )
    .await
}

pub async fn smoke(args: SmokeArgs) -> Result<ExitCode, RunError> {
    let spec = ScenarioSpec::smoke(
        "smoke",
        SmokeSpec {
            vus: 1,
            duration: args.duration,
            sleep_between: args.sleep,
        },
    );

    let request = build_request(
        args.base_url.as_deref(),
        &RequestYaml {
            path: args.target.clone(),
            ..RequestYaml::default()
        },
    )
    .map_err(RunError::InvalidInput)?;

    execute(
        Path::new(&args.target),
        args.output,
        spec,
        request,
        vec![Check::status_under(500)],
        surge_core::runner::GateSet::default(),
    )
    .await
}

fn build_request(base_url: Option<&str>, yaml: &RequestYaml) -> anyhow::Result<RequestFn> {
    let url = scenario_yaml::resolve_url(base_url, &yaml.path)?;

    let template = HttpRequest::from_parts(
        yaml.method.as_deref().unwrap_or("GET"),
        url,
        yaml.body.clone(),
    )
    .context("invalid request descriptor")?
    .with_timeout(
        yaml.timeout
            .map(scenario_yaml::YamlDuration::into_inner)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
    );

    Ok(request_fn(HttpClient::default(), template))
}

async fn execute(
    source: &Path,
    format: crate::cli::OutputFormat,
    spec: ScenarioSpec,
    request: RequestFn,
    checks: Vec<Check>,
    gates: surge_core::runner::GateSet,
) -> Result<ExitCode, RunError> {
    let out = output::formatter(format);
    out.print_header(source, &spec);

    let runner = ScenarioRunner::new();

    // Ctrl-C trips the cancel flag; the runner drains and still reports.
    let cancel = runner.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut run = ScenarioRun::new(spec, request)
        .with_checks(checks)
        .with_gates(gates);
    if let Some(progress) = out.progress() {
        run = run.with_progress(progress);
    }

    let report = runner.run(run).await.map_err(|err| match &err {
        surge_core::runner::Error::Config(_) => RunError::InvalidInput(err.into()),
        _ => RunError::RuntimeError(err.into()),
    })?;

    out.print_report(&report).map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_report(!report.passed()))
}
