//! Read-only projection of a Cloud Logging `LogEntry`.
//!
//! Which fields are populated depends on the environment and on what the
//! ingestion agent lifts out of the raw payload, so nearly everything here is
//! optional. A missing field is an expected state, not a decoding error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Log severity as understood by the logging backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Severity {
    Default,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    pub const ALL: [Severity; 9] = [
        Severity::Default,
        Severity::Debug,
        Severity::Info,
        Severity::Notice,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Alert,
        Severity::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Default => "DEFAULT",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Alert => "ALERT",
            Severity::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSeverity(pub String);

impl fmt::Display for UnknownSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown severity '{}'", self.0)
    }
}

impl std::error::Error for UnknownSeverity {}

impl FromStr for Severity {
    type Err = UnknownSeverity;

    /// Case-insensitive, so `warning` and `WARNING` are the same severity.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| UnknownSeverity(s.to_string()))
    }
}

impl TryFrom<String> for Severity {
    type Error = UnknownSeverity;

    fn try_from(value: String) -> Result<Self, <Self as TryFrom<String>>::Error> {
        value.parse()
    }
}

/// Reads a severity the way agents actually write it. A value no variant
/// matches is dropped rather than failing the entry, and with it the page.
fn lenient_severity<'de, D>(deserializer: D) -> Result<Option<Severity>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| match raw.parse() {
        Ok(severity) => Some(severity),
        Err(err) => {
            tracing::debug!("ignoring {err}");
            None
        }
    }))
}

/// Backend-side classification of whatever produced the entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoredResource {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `jsonPayload`, or `protoPayload` rendered as JSON.
    Json(Map<String, Value>),
    /// `textPayload`. Entries without any payload decode as empty text.
    Text(String),
}

impl Payload {
    /// The human message carried by the payload: `message` for structured
    /// payloads, the whole string for text payloads.
    pub fn message(&self) -> Option<&str> {
        match self {
            Payload::Json(map) => map.get("message").and_then(Value::as_str),
            Payload::Text(text) => Some(text.as_str()),
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Payload::Json(map) => map.get(key),
            Payload::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireEntry", into = "WireEntry")]
pub struct LogEntry {
    pub log_name: String,
    pub payload: Payload,
    /// `None` both when the backend omits the field and when it reports `DEFAULT`.
    pub severity: Option<Severity>,
    pub insert_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub trace: Option<String>,
    pub span_id: Option<String>,
    pub trace_sampled: Option<bool>,
    pub http_request: Option<Map<String, Value>>,
    pub resource: Option<MonitoredResource>,
    pub labels: Option<HashMap<String, String>>,
}

impl LogEntry {
    pub fn text(log_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_payload(log_name, Payload::Text(text.into()))
    }

    pub fn json(log_name: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self::with_payload(log_name, Payload::Json(payload))
    }

    fn with_payload(log_name: impl Into<String>, payload: Payload) -> Self {
        Self {
            log_name: log_name.into(),
            payload,
            severity: None,
            insert_id: None,
            timestamp: None,
            trace: None,
            span_id: None,
            trace_sampled: None,
            http_request: None,
            resource: None,
            labels: None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.payload.message()
    }

    /// Substring match on the normalized message. Entries without a message
    /// never match.
    pub fn message_contains(&self, needle: &str) -> bool {
        self.message().is_some_and(|message| message.contains(needle))
    }
}

/// The entry as it appears on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry {
    #[serde(default)]
    log_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource: Option<MonitoredResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient_severity",
        skip_serializing_if = "Option::is_none"
    )]
    severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    insert_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_request: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    labels: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace_sampled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text_payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    json_payload: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proto_payload: Option<Map<String, Value>>,
}

impl From<WireEntry> for LogEntry {
    fn from(wire: WireEntry) -> Self {
        let payload = match (wire.json_payload, wire.proto_payload, wire.text_payload) {
            (Some(json), _, _) => Payload::Json(json),
            (None, Some(proto), _) => Payload::Json(proto),
            (None, None, text) => Payload::Text(text.unwrap_or_default()),
        };
        Self {
            log_name: wire.log_name,
            payload,
            severity: wire.severity.filter(|severity| *severity != Severity::Default),
            insert_id: wire.insert_id,
            timestamp: wire.timestamp,
            trace: wire.trace,
            span_id: wire.span_id,
            trace_sampled: wire.trace_sampled,
            http_request: wire.http_request,
            resource: wire.resource,
            labels: wire.labels,
        }
    }
}

impl From<LogEntry> for WireEntry {
    fn from(entry: LogEntry) -> Self {
        let (json_payload, text_payload) = match entry.payload {
            Payload::Json(map) => (Some(map), None),
            Payload::Text(text) => (None, Some(text)),
        };
        Self {
            log_name: entry.log_name,
            resource: entry.resource,
            timestamp: entry.timestamp,
            severity: entry.severity,
            insert_id: entry.insert_id,
            http_request: entry.http_request,
            labels: entry.labels,
            trace: entry.trace,
            span_id: entry.span_id,
            trace_sampled: entry.trace_sampled,
            text_payload,
            json_payload,
            proto_payload: None,
        }
    }
}
