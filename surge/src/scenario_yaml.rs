use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use surge_core::runner::{
    Check, GateSet, OpenModelSpec, ProfileKind, ScenarioSpec, SmokeSpec, Stage,
};

/// Scenario descriptor document, camelCase on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Profile kind: open-model (alias ramping-arrival-rate) | smoke
    pub profile: String,

    // open-model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time_unit: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stages: Vec<StageYaml>,

    #[serde(rename = "preAllocatedVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_allocated_vus: Option<u64>,

    #[serde(rename = "maxVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_vus: Option<u64>,

    // smoke
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vus: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sleep_between: Option<YamlDuration>,

    // shared
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub drain_grace: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub idle_grace: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestYaml>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub checks: Vec<CheckYaml>,

    #[serde(skip_serializing_if = "GatesYaml::is_empty", default)]
    pub gates: GatesYaml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub target: f64,

    #[serde(default)]
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RequestYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Relative path (resolved against the base URL) or absolute http:// URL.
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout: Option<YamlDuration>,
}

impl Default for RequestYaml {
    fn default() -> Self {
        Self {
            method: None,
            path: "/".to_string(),
            body: None,
            timeout: None,
        }
    }
}

/// One declarative check: exactly one predicate field must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CheckYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_is: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_under: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_contains: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_duration: Option<YamlDuration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct GatesYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_check_fail_ratio: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_dropped_ratio: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_error_ratio: Option<f64>,

    #[serde(rename = "maxP95Ms")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_p95_ms: Option<f64>,
}

impl GatesYaml {
    fn is_empty(&self) -> bool {
        self.max_check_fail_ratio.is_none()
            && self.max_dropped_ratio.is_none()
            && self.max_error_ratio.is_none()
            && self.max_p95_ms.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for YamlDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for YamlDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v <= 0 {
                    return Err(E::custom("duration must be positive"));
                }
                Ok(YamlDuration(Duration::from_secs(v as u64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v <= 0.0 {
                    return Err(E::custom("duration must be a positive, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// A descriptor resolved into engine types, minus the base URL.
#[derive(Debug)]
pub(crate) struct LoadedScenario {
    pub spec: ScenarioSpec,
    pub request: RequestYaml,
    pub checks: Vec<Check>,
    pub gates: GateSet,
}

pub(crate) async fn load_scenario_from_yaml(path: &Path) -> anyhow::Result<LoadedScenario> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read scenario YAML: {}", path.display()))?;

    let doc: ScenarioYaml = serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main")
        .to_string();

    scenario_yaml_into_loaded(doc, default_name)
}

pub(crate) fn scenario_yaml_into_loaded(
    doc: ScenarioYaml,
    default_name: String,
) -> anyhow::Result<LoadedScenario> {
    let name = doc.name.clone().unwrap_or(default_name);

    let kind: ProfileKind = doc
        .profile
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown profile `{}` (expected open-model or smoke)", doc.profile))?;

    let mut spec = match kind {
        ProfileKind::OpenModel => ScenarioSpec::open_model(
            name,
            OpenModelSpec {
                start_rate: doc.start_rate.unwrap_or(0.0),
                time_unit: doc
                    .time_unit
                    .map(YamlDuration::into_inner)
                    .unwrap_or(Duration::from_secs(1)),
                stages: doc
                    .stages
                    .iter()
                    .map(|s| Stage {
                        target: s.target,
                        duration: s.duration.into_inner(),
                    })
                    .collect(),
                pre_allocated_vus: doc.pre_allocated_vus.unwrap_or(1) as usize,
                max_vus: doc.max_vus.or(doc.pre_allocated_vus).unwrap_or(1) as usize,
            },
        ),
        ProfileKind::Smoke => ScenarioSpec::smoke(
            name,
            SmokeSpec {
                vus: doc.vus.unwrap_or(1),
                duration: doc
                    .duration
                    .map(YamlDuration::into_inner)
                    .unwrap_or(Duration::from_secs(20)),
                sleep_between: doc
                    .sleep_between
                    .map(YamlDuration::into_inner)
                    .unwrap_or(Duration::from_secs(1)),
            },
        ),
    };

    if let Some(grace) = doc.drain_grace {
        spec = spec.with_drain_grace(grace.into_inner());
    }
    if let Some(grace) = doc.idle_grace {
        spec = spec.with_idle_grace(grace.into_inner());
    }

    let checks = doc
        .checks
        .iter()
        .map(check_yaml_into_check)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let gates = GateSet {
        max_check_fail_ratio: doc.gates.max_check_fail_ratio,
        max_dropped_ratio: doc.gates.max_dropped_ratio,
        max_error_ratio: doc.gates.max_error_ratio,
        max_p95_ms: doc.gates.max_p95_ms,
    };

    Ok(LoadedScenario {
        spec,
        request: doc.request.unwrap_or_default(),
        checks,
        gates,
    })
}

fn check_yaml_into_check(yaml: &CheckYaml) -> anyhow::Result<Check> {
    let mut built: Vec<Check> = Vec::new();

    if let Some(status) = yaml.status_is {
        built.push(Check::status_is(status));
    }
    if let Some(limit) = yaml.status_under {
        built.push(Check::status_under(limit));
    }
    if let Some(needle) = &yaml.body_contains {
        built.push(Check::body_contains(needle.clone()));
    }
    if let Some(limit) = yaml.max_duration {
        built.push(Check::max_duration(limit.into_inner()));
    }

    let mut check = match built.len() {
        1 => built.remove(0),
        0 => anyhow::bail!(
            "check needs one of statusIs, statusUnder, bodyContains, maxDuration"
        ),
        _ => anyhow::bail!("check must set exactly one predicate"),
    };

    if let Some(name) = &yaml.name {
        check.name = std::sync::Arc::from(name.as_str());
    }

    Ok(check)
}

/// Resolve a descriptor path against the base URL. Absolute http:// URLs
/// pass through; everything else needs a base. The client speaks plain
/// http only, so https targets are rejected here rather than failing
/// every iteration at runtime.
pub(crate) fn resolve_url(base_url: Option<&str>, path: &str) -> anyhow::Result<String> {
    if path.starts_with("https://") {
        anyhow::bail!("https:// targets are not supported (got `{path}`); use an http:// URL");
    }
    if path.starts_with("http://") {
        return Ok(path.to_string());
    }

    let base = base_url
        .with_context(|| format!("relative path `{path}` needs --base-url or BASE_URL"))?
        .trim_end_matches('/');

    if path.starts_with('/') {
        Ok(format!("{base}{path}"))
    } else {
        Ok(format!("{base}/{path}"))
    }
}
