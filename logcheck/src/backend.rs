use crate::error::BackendError;
use async_trait::async_trait;
use logging_client::{LogEntry, LoggingClient};
use std::sync::Arc;

/// Anything that can answer a log filter.
#[async_trait]
pub trait LogBackend: Send + Sync {
    async fn list_entries(&self, filter: &str) -> Result<Vec<LogEntry>, BackendError>;
}

#[async_trait]
impl LogBackend for LoggingClient {
    async fn list_entries(&self, filter: &str) -> Result<Vec<LogEntry>, BackendError> {
        Ok(LoggingClient::list_entries(self, filter).await?)
    }
}

#[async_trait]
impl<B: LogBackend + ?Sized> LogBackend for Arc<B> {
    async fn list_entries(&self, filter: &str) -> Result<Vec<LogEntry>, BackendError> {
        (**self).list_entries(filter).await
    }
}
