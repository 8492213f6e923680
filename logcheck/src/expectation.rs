//! What each deployment target is expected to put on its entries.
//!
//! Ingestion agents lift different subsets of structured metadata depending on
//! the environment, so every expectation is an explicit capability map: a
//! field that is `None` (or an empty key list) is simply not asserted there.

use crate::error::HarnessError;
use chrono::{DateTime, Utc};
use logging_client::Severity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceExpectation {
    /// Monitored-resource type, e.g. `k8s_container`.
    pub kind: String,
    /// Label keys that must be present and non-empty.
    pub labels: Vec<String>,
}

/// Fields an agent lifts out of a JSON line written to stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StdoutExpectation {
    pub log_name: Option<String>,
    pub severity: Option<Severity>,
    pub insert_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Substring of `trace`, so the check stays agnostic of the project id.
    pub trace_contains: Option<String>,
    pub span_id: Option<String>,
    pub trace_sampled: Option<bool>,
    pub labels: Vec<String>,
    pub resource_type: Option<String>,
    pub resource_labels: Vec<String>,
    pub payload_props: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentExpectation {
    pub environment: String,
    pub language: String,
    pub resource: Option<ResourceExpectation>,
    /// `httpRequest` keys that must be set on request logs.
    pub request_props: Option<Vec<String>>,
    pub stdout: Option<StdoutExpectation>,
    /// Whether the sample honours an explicit severity on `simplelog`.
    pub severity_round_trip: bool,
    /// Whether the sample has a `pylogging` snippet.
    pub python_logging: bool,
}

const KNOWN_TARGETS: &[(&str, &str)] = &[
    ("functions", "nodejs"),
    ("kubernetes", "nodejs"),
    ("kubernetes", "python"),
    ("cloudrun", "python"),
];

fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|key| key.to_string()).collect()
}

fn request_props() -> Vec<String> {
    keys(&["requestMethod", "requestUrl", "protocol"])
}

impl EnvironmentExpectation {
    fn bare(environment: &str, language: &str) -> Self {
        Self {
            environment: environment.to_string(),
            language: language.to_string(),
            resource: None,
            request_props: None,
            stdout: None,
            severity_round_trip: false,
            python_logging: false,
        }
    }

    /// Preset for a deployment target and sample language.
    pub fn for_target(environment: &str, language: &str) -> Result<Self, HarnessError> {
        let expectation = match (environment, language) {
            ("functions", "nodejs") => Self {
                resource: Some(ResourceExpectation {
                    kind: "cloud_function".into(),
                    labels: keys(&["region", "function_name", "project_id"]),
                }),
                request_props: Some(request_props()),
                stdout: Some(StdoutExpectation {
                    severity: Some(Severity::Warning),
                    // `execution_id` is added by the functions agent.
                    labels: keys(&["foo", "execution_id"]),
                    // The functions agent leaves these in the payload.
                    payload_props: keys(&["message", "resource", "timestamp", "logName"]),
                    ..StdoutExpectation::default()
                }),
                ..Self::bare(environment, language)
            },
            ("kubernetes", "nodejs") => Self {
                resource: Some(ResourceExpectation {
                    kind: "k8s_container".into(),
                    labels: keys(&[
                        "project_id",
                        "location",
                        "cluster_name",
                        "pod_name",
                        "namespace_name",
                    ]),
                }),
                request_props: Some(request_props()),
                stdout: Some(StdoutExpectation {
                    severity: Some(Severity::Warning),
                    insert_id: Some("42".into()),
                    trace_contains: Some("/traces/0679686673a".into()),
                    span_id: Some("000000000000004a".into()),
                    trace_sampled: Some(true),
                    labels: keys(&["foo"]),
                    payload_props: keys(&["message", "resource", "timestamp", "logName"]),
                    ..StdoutExpectation::default()
                }),
                ..Self::bare(environment, language)
            },
            ("kubernetes", "python") => Self {
                resource: Some(ResourceExpectation {
                    kind: "k8s_container".into(),
                    labels: keys(&[
                        "project_id",
                        "location",
                        "cluster_name",
                        "namespace_name",
                        "pod_name",
                        "container_name",
                    ]),
                }),
                severity_round_trip: true,
                python_logging: true,
                ..Self::bare(environment, language)
            },
            ("cloudrun", "python") => Self {
                resource: Some(ResourceExpectation {
                    kind: "cloud_run_revision".into(),
                    labels: keys(&[
                        "project_id",
                        "service_name",
                        "revision_name",
                        "location",
                        "configuration_name",
                    ]),
                }),
                severity_round_trip: true,
                python_logging: true,
                ..Self::bare(environment, language)
            },
            _ => {
                let known = KNOWN_TARGETS
                    .iter()
                    .map(|(env, lang)| format!("{env}/{lang}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(HarnessError::Configuration(format!(
                    "no expectations for {environment}/{language} (known: {known})"
                )));
            }
        };
        Ok(expectation)
    }
}
