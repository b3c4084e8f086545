use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::http::{self, HttpClient, HttpRequest, HttpResponse};

use super::stats::{IterationSample, RunStats};

/// The body of one iteration: build a request, await a response.
///
/// The runner calls this once per arrival; the closure owns everything it
/// needs (client, URL, payload) so iterations never share mutable state.
pub type RequestFn = Arc<
    dyn Fn() -> Pin<Box<dyn Future<Output = http::Result<HttpResponse>> + Send>> + Send + Sync,
>;

/// Build a `RequestFn` that replays the same request through a shared client.
pub fn request_fn(client: HttpClient, template: HttpRequest) -> RequestFn {
    Arc::new(move || {
        let client = client.clone();
        let req = template.clone();
        Box::pin(async move { client.request(req).await })
    })
}

/// Everything a check predicate may inspect about one finished iteration.
#[derive(Debug)]
pub struct FetchOutcome {
    pub status: Option<u16>,
    pub body: Bytes,
    pub latency: Duration,
    pub error: Option<http::Error>,
}

impl FetchOutcome {
    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    fn sample(&self) -> IterationSample {
        IterationSample {
            status: self.status,
            transport_error_kind: self.error.as_ref().map(http::Error::transport_kind),
            latency: self.latency,
        }
    }
}

/// A named pass/fail assertion evaluated against every iteration's outcome.
/// Check failures are tallied, never fatal.
#[derive(Clone)]
pub struct Check {
    pub name: Arc<str>,
    pub predicate: Arc<dyn Fn(&FetchOutcome) -> bool + Send + Sync>,
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

impl Check {
    pub fn new(
        name: impl Into<Arc<str>>,
        predicate: impl Fn(&FetchOutcome) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn status_is(expected: u16) -> Self {
        Self::new(format!("status is {expected}"), move |o| {
            o.status == Some(expected)
        })
    }

    pub fn status_under(limit: u16) -> Self {
        Self::new(format!("status < {limit}"), move |o| {
            o.status.is_some_and(|s| s < limit)
        })
    }

    pub fn body_contains(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::new(format!("body contains {needle:?}"), move |o| {
            o.body_utf8().is_some_and(|body| body.contains(&needle))
        })
    }

    pub fn max_duration(limit: Duration) -> Self {
        Self::new(format!("duration <= {limit:?}"), move |o| {
            o.latency <= limit
        })
    }
}

/// Run one iteration end to end: execute the request, time it, evaluate
/// checks, and record the sample. Infallible by design; every failure mode
/// becomes a classified sample.
pub async fn run_iteration(request: &RequestFn, checks: &[CheckWithHandle], stats: &RunStats) {
    let started = Instant::now();
    let result = request().await;
    let latency = started.elapsed();

    let outcome = match result {
        Ok(response) => FetchOutcome {
            status: Some(response.status),
            body: response.body,
            latency,
            error: None,
        },
        Err(err) => FetchOutcome {
            status: None,
            body: Bytes::new(),
            latency,
            error: Some(err),
        },
    };

    for check in checks {
        let ok = (check.check.predicate)(&outcome);
        stats.record_check(&check.handle, ok);
    }

    stats.record_iteration(outcome.sample());
}

/// A check paired with its pre-resolved stats handle, so the hot path never
/// touches the name map.
#[derive(Debug, Clone)]
pub struct CheckWithHandle {
    pub check: Check,
    pub handle: super::stats::CheckHandle,
}

pub fn bind_checks(checks: &[Check], stats: &RunStats) -> Vec<CheckWithHandle> {
    checks
        .iter()
        .map(|check| CheckWithHandle {
            check: check.clone(),
            handle: stats.check_handle(&check.name),
        })
        .collect()
}
