mod entry;
mod error;
mod http;
mod otel;

pub use otel::inject_opentelemetry_context_into_request;

pub use entry::{LogEntry, MonitoredResource, Payload, Severity, UnknownSeverity};
pub use error::ClientError;
pub use http::{ClientSettings, LoggingClient, DEFAULT_API_URL};
