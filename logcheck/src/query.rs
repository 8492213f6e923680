use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Microseconds with an explicit offset, e.g. `2021-06-01T10:00:00.123456+00:00`.
const FILTER_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

/// A filter ready to hand to the backend. Built once per triggered log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    filter_expression: String,
    since: Option<DateTime<Utc>>,
}

impl LogQuery {
    /// Wraps a filter obtained elsewhere (the environment's default filter).
    /// Such a query carries no time bound of its own.
    pub fn from_raw(filter_expression: impl Into<String>) -> Self {
        Self {
            filter_expression: filter_expression.into(),
            since: None,
        }
    }

    pub fn filter_expression(&self) -> &str {
        &self.filter_expression
    }

    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }
}

/// `"<fingerprint>" AND timestamp > "<now - skew>"`.
///
/// `now` is the moment of the trigger, not of the query, so the lower bound
/// absorbs clock disagreement between this host and the backend. The time
/// clause only limits scan cost; the fingerprint is what selects the entry.
pub fn build_filter(fingerprint: &str, now: DateTime<Utc>, skew: Duration) -> LogQuery {
    let since = chrono::Duration::from_std(skew)
        .ok()
        .and_then(|skew| now.checked_sub_signed(skew))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    LogQuery {
        filter_expression: format!(
            "\"{}\" AND timestamp > \"{}\"",
            escape_filter_string(fingerprint),
            since.format(FILTER_TIME_FORMAT)
        ),
        since: Some(since),
    }
}

fn escape_filter_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// RFC 3339 rendering used when logging a query's bound.
pub fn describe_since(query: &LogQuery) -> String {
    query
        .since()
        .map(|since| since.to_rfc3339_opts(SecondsFormat::Micros, false))
        .unwrap_or_else(|| "unbounded".to_string())
}
