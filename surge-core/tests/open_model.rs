use std::time::Duration;

use surge_core::runner::{
    Check, GateSet, OpenModelSpec, RunPhase, ScenarioRun, ScenarioRunner, ScenarioSpec, SmokeSpec,
    Stage, request_fn,
};
use surge_core::{HttpClient, HttpRequest};
use surge_testserver::TestServer;

fn open_model(name: &str, rate: f64, secs: u64, pre: usize, max: usize) -> ScenarioSpec {
    ScenarioSpec::open_model(
        name,
        OpenModelSpec {
            start_rate: rate,
            time_unit: Duration::from_secs(1),
            stages: vec![Stage {
                target: rate,
                duration: Duration::from_secs(secs),
            }],
            pre_allocated_vus: pre,
            max_vus: max,
        },
    )
}

#[tokio::test]
async fn open_model_drives_the_target_at_the_scheduled_rate() {
    let server = match TestServer::start().await {
        Ok(s) => s,
        Err(err) => panic!("start test server: {err}"),
    };

    let request = request_fn(
        HttpClient::default(),
        HttpRequest::get(&server.urls().books).with_timeout(Duration::from_secs(5)),
    );
    let spec = open_model("books", 20.0, 2, 10, 50);

    let runner = ScenarioRunner::new();
    let report = match runner
        .run(
            ScenarioRun::new(spec, request)
                .with_checks(vec![Check::status_is(200), Check::body_contains("Book 1")]),
        )
        .await
    {
        Ok(report) => report,
        Err(err) => panic!("run failed: {err}"),
    };

    // 20/s over 2s is exactly 40 arrivals; the pool is large enough that
    // none should be shed against a local server.
    assert_eq!(report.summary.dispatched_total(), 40);
    assert_eq!(report.summary.dropped_iterations_total, 0);
    assert_eq!(report.summary.status_2xx, 40);
    assert_eq!(report.summary.checks_failed, 0);
    assert_eq!(server.stats().requests_total(), 40);
    assert_eq!(*runner.phase().borrow(), RunPhase::Completed);

    server.shutdown().await;
}

#[tokio::test]
async fn smoke_profile_iterates_and_validates_health() {
    let server = match TestServer::start().await {
        Ok(s) => s,
        Err(err) => panic!("start test server: {err}"),
    };

    let request = request_fn(
        HttpClient::default(),
        HttpRequest::get(&server.urls().health).with_timeout(Duration::from_secs(5)),
    );
    let spec = ScenarioSpec::smoke(
        "smoke",
        SmokeSpec {
            vus: 1,
            duration: Duration::from_secs(3),
            sleep_between: Duration::from_millis(500),
        },
    );

    let report = match ScenarioRunner::new()
        .run(
            ScenarioRun::new(spec, request)
                .with_checks(vec![Check::status_is(200), Check::body_contains("ok")]),
        )
        .await
    {
        Ok(report) => report,
        Err(err) => panic!("run failed: {err}"),
    };

    // One iteration roughly every 500ms for 3s.
    assert!(
        (5..=7).contains(&report.summary.iterations_total),
        "got {} iterations",
        report.summary.iterations_total
    );
    assert_eq!(report.summary.checks_failed, 0);
    assert!(report.passed());

    server.shutdown().await;
}

#[tokio::test]
async fn server_errors_trip_the_error_gate() {
    let server = match TestServer::start().await {
        Ok(s) => s,
        Err(err) => panic!("start test server: {err}"),
    };

    let request = request_fn(
        HttpClient::default(),
        HttpRequest::get(&server.urls().flaky).with_timeout(Duration::from_secs(5)),
    );
    let spec = open_model("flaky", 10.0, 2, 5, 10);
    let gates = GateSet {
        max_error_ratio: Some(0.1),
        ..GateSet::default()
    };

    let runner = ScenarioRunner::new();
    let report = match runner
        .run(ScenarioRun::new(spec, request).with_gates(gates))
        .await
    {
        Ok(report) => report,
        Err(err) => panic!("run failed: {err}"),
    };

    // The endpoint 503s every third request, far above the 10% tolerance.
    assert!(report.summary.status_5xx > 0);
    assert!(!report.passed());
    assert_eq!(report.violations[0].gate, "error_ratio");
    // Gate failures leave the run in Completed; the report carries the verdict.
    assert_eq!(*runner.phase().borrow(), RunPhase::Completed);

    server.shutdown().await;
}

#[tokio::test]
async fn slow_responses_classify_as_timeouts() {
    let server = match TestServer::start().await {
        Ok(s) => s,
        Err(err) => panic!("start test server: {err}"),
    };

    let url = format!("{}?ms=500", server.urls().slow);
    let request = request_fn(
        HttpClient::default(),
        HttpRequest::get(&url).with_timeout(Duration::from_millis(50)),
    );
    let spec = open_model("slow", 5.0, 1, 5, 10);

    let report = match ScenarioRunner::new()
        .run(ScenarioRun::new(spec, request))
        .await
    {
        Ok(report) => report,
        Err(err) => panic!("run failed: {err}"),
    };

    assert_eq!(report.summary.iterations_total, 5);
    assert_eq!(report.summary.timeouts_total, 5);
    assert_eq!(report.summary.status_2xx, 0);

    server.shutdown().await;
}
