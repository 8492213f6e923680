use crate::error::HarnessError;
use crate::expectation::{EnvironmentExpectation, StdoutExpectation};
use logging_client::{LogEntry, Severity};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail(String),
    /// Not declared for this environment.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCheck {
    pub field: String,
    pub outcome: Outcome,
}

impl FieldCheck {
    fn new(field: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            field: field.into(),
            outcome,
        }
    }

    fn skip(field: impl Into<String>) -> Self {
        Self::new(field, Outcome::Skip)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssertionReport {
    pub checks: Vec<FieldCheck>,
}

impl AssertionReport {
    pub fn passed(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FieldCheck> {
        self.checks
            .iter()
            .filter(|check| matches!(check.outcome, Outcome::Fail(_)))
    }

    pub fn count(&self, outcome: fn(&Outcome) -> bool) -> usize {
        self.checks.iter().filter(|check| outcome(&check.outcome)).count()
    }

    pub fn into_result(self, scenario: &'static str) -> Result<(), HarnessError> {
        if self.passed() {
            return Ok(());
        }
        Err(HarnessError::ScenarioFailed {
            scenario,
            reason: self.to_string(),
        })
    }

    fn push(&mut self, check: FieldCheck) {
        self.checks.push(check);
    }
}

impl fmt::Display for AssertionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures = self
            .failures()
            .map(|check| match &check.outcome {
                Outcome::Fail(reason) => format!("{}: {reason}", check.field),
                _ => check.field.clone(),
            })
            .collect::<Vec<_>>();
        if failures.is_empty() {
            write!(f, "all {} checks passed", self.checks.len())
        } else {
            f.write_str(&failures.join("; "))
        }
    }
}

fn equals<T: PartialEq + fmt::Debug>(field: &str, found: Option<&T>, expected: &T) -> FieldCheck {
    let outcome = match found {
        Some(found) if found == expected => Outcome::Pass,
        Some(found) => Outcome::Fail(format!("expected {expected:?}, found {found:?}")),
        None => Outcome::Fail(format!("expected {expected:?}, field is absent")),
    };
    FieldCheck::new(field, outcome)
}

/// Present and meaningful: not null, not `false`, not an empty string,
/// array or object.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

fn label_checks(
    report: &mut AssertionReport,
    prefix: &str,
    labels: Option<&HashMap<String, String>>,
    required: &[String],
) {
    for key in required {
        let outcome = match labels.and_then(|labels| labels.get(key)) {
            Some(value) if !value.is_empty() => Outcome::Pass,
            Some(_) => Outcome::Fail("label is empty".into()),
            None => Outcome::Fail("label is not set".into()),
        };
        report.push(FieldCheck::new(format!("{prefix}[{key}]"), outcome));
    }
}

pub fn check_monitored_resource(
    entry: &LogEntry,
    expectation: &EnvironmentExpectation,
) -> AssertionReport {
    let mut report = AssertionReport::default();
    let Some(expected) = &expectation.resource else {
        report.push(FieldCheck::skip("resource"));
        return report;
    };

    let resource = entry.resource.as_ref();
    report.push(equals(
        "resource.type",
        resource.map(|resource| &resource.kind),
        &expected.kind,
    ));
    label_checks(
        &mut report,
        "resource.labels",
        resource.map(|resource| &resource.labels),
        &expected.labels,
    );
    report
}

pub fn check_http_request(
    entry: &LogEntry,
    expectation: &EnvironmentExpectation,
) -> AssertionReport {
    let mut report = AssertionReport::default();
    let Some(props) = &expectation.request_props else {
        report.push(FieldCheck::skip("httpRequest"));
        return report;
    };

    for prop in props {
        let outcome = match entry.http_request.as_ref().and_then(|request| request.get(prop)) {
            Some(value) if is_truthy(value) => Outcome::Pass,
            Some(_) => Outcome::Fail("field is empty".into()),
            None => Outcome::Fail("field is not set".into()),
        };
        report.push(FieldCheck::new(format!("httpRequest[{prop}]"), outcome));
    }
    report
}

pub fn check_stdout_fields(
    entry: &LogEntry,
    expectation: &EnvironmentExpectation,
) -> AssertionReport {
    let mut report = AssertionReport::default();
    let Some(expected) = &expectation.stdout else {
        report.push(FieldCheck::skip("stdout"));
        return report;
    };
    let StdoutExpectation {
        log_name,
        severity,
        insert_id,
        timestamp,
        trace_contains,
        span_id,
        trace_sampled,
        labels,
        resource_type,
        resource_labels,
        payload_props,
    } = expected;

    if let Some(log_name) = log_name {
        report.push(equals("logName", Some(&entry.log_name), log_name));
    }
    if let Some(severity) = severity {
        report.push(equals("severity", entry.severity.as_ref(), severity));
    }
    if let Some(insert_id) = insert_id {
        report.push(equals("insertId", entry.insert_id.as_ref(), insert_id));
    }
    if let Some(timestamp) = timestamp {
        report.push(equals("timestamp", entry.timestamp.as_ref(), timestamp));
    }
    if let Some(needle) = trace_contains {
        let outcome = match &entry.trace {
            Some(trace) if trace.contains(needle.as_str()) => Outcome::Pass,
            Some(trace) => Outcome::Fail(format!("{trace:?} does not contain {needle:?}")),
            None => Outcome::Fail("field is absent".into()),
        };
        report.push(FieldCheck::new("trace", outcome));
    }
    if let Some(span_id) = span_id {
        report.push(equals("spanId", entry.span_id.as_ref(), span_id));
    }
    if let Some(trace_sampled) = trace_sampled {
        report.push(equals("traceSampled", entry.trace_sampled.as_ref(), trace_sampled));
    }
    label_checks(&mut report, "labels", entry.labels.as_ref(), labels);
    if let Some(resource_type) = resource_type {
        report.push(equals(
            "resource.type",
            entry.resource.as_ref().map(|resource| &resource.kind),
            resource_type,
        ));
    }
    label_checks(
        &mut report,
        "resource.labels",
        entry.resource.as_ref().map(|resource| &resource.labels),
        resource_labels,
    );
    for prop in payload_props {
        let outcome = match entry.payload.field(prop) {
            Some(value) if is_truthy(value) => Outcome::Pass,
            Some(_) => Outcome::Fail("field is empty".into()),
            None => Outcome::Fail("field is not in the payload".into()),
        };
        report.push(FieldCheck::new(format!("payload[{prop}]"), outcome));
    }
    report
}

/// Severity round trip. Triggering with `DEFAULT` must leave the field empty.
pub fn check_severity(entry: &LogEntry, triggered: Severity) -> FieldCheck {
    let outcome = match (triggered, entry.severity) {
        (Severity::Default, None) => Outcome::Pass,
        (Severity::Default, Some(found)) => {
            Outcome::Fail(format!("expected no severity, found {found}"))
        }
        (expected, Some(found)) if found.as_str().eq_ignore_ascii_case(expected.as_str()) => {
            Outcome::Pass
        }
        (expected, Some(found)) => Outcome::Fail(format!("expected {expected}, found {found}")),
        (expected, None) => Outcome::Fail(format!("expected {expected}, field is absent")),
    };
    FieldCheck::new("severity", outcome)
}
