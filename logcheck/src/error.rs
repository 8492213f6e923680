//! Error taxonomy of the harness.
//!
//! [`PollError`] is the retryable side and never leaves the retriever.
//! Everything a caller can observe is a [`HarnessError`].

use crate::script::Command;
use thiserror::Error;

/// Failure of a single backend listing.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Client(#[from] logging_client::ClientError),

    /// Raised by backends other than the HTTP client (fakes, proxies).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of one poll that did not produce entries.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("no matching entries yet")]
    NoMatchYet,

    #[error("transport error: {0}")]
    Transport(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Inner and outer retry budgets are spent. Carries no partial result.
    #[error("logs not found after {attempts} attempts (filter: {filter})")]
    LogsNotFound { filter: String, attempts: u32 },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not build logging client: {0}")]
    ClientSetup(#[from] logging_client::ClientError),

    #[error("could not run envctl {command}: {source}")]
    Script {
        command: Command,
        #[source]
        source: std::io::Error,
    },

    #[error("trigger of snippet '{snippet}' exited with status {status}: {stderr}")]
    TriggerFailed {
        snippet: String,
        status: i32,
        stderr: String,
    },

    #[error("envctl {command} exited with status {status}: {stderr}")]
    CommandFailed {
        command: Command,
        status: i32,
        stderr: String,
    },

    #[error("{scenario}: {reason}")]
    ScenarioFailed {
        scenario: &'static str,
        reason: String,
    },
}

impl HarnessError {
    /// True for the conditions the outer retry loop is allowed to absorb.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HarnessError::LogsNotFound { .. })
    }
}
