//! Eventually-consistent retrieval of triggered log entries.
//!
//! Entries travel through an agent pipeline with unknown latency before they
//! become queryable, so one listing is never enough. [`PollingRetriever`]
//! waits a short propagation window, then polls on a fixed backoff until the
//! backend returns something or the attempt budget runs out:
//!
//! ```text
//! Init --post_trigger_delay--> Querying --non-empty--> Done
//!                                 |  ^
//!                  empty/transport|  |inter_try_delay
//!                                 v  |
//!                               Backoff --attempts >= max_tries--> Exhausted
//! ```
//!
//! Empty results and transport errors are both absorbed here. Only
//! exhaustion ([`HarnessError::LogsNotFound`]) reaches the caller.

use crate::backend::LogBackend;
use crate::config::RetryPolicy;
use crate::error::{HarnessError, PollError};
use crate::query::{describe_since, LogQuery};
use logging_client::LogEntry;
use tracing::instrument;

/// Bookkeeping for one retrieval call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Queries issued so far.
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
}

impl RetryState {
    fn new(max_attempts: u32) -> Self {
        Self {
            attempts_made: 0,
            max_attempts,
            last_error: None,
        }
    }

    fn exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

/// Entries returned by a successful retrieval, in backend order. The last
/// element is the most recent match.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub entries: Vec<LogEntry>,
    pub state: RetryState,
}

impl Retrieved {
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Last entry whose normalized message contains `needle`. The coarse
    /// filter can also match unrelated traffic, so callers look here rather
    /// than trusting the first hit.
    pub fn find_message(&self, needle: &str) -> Option<&LogEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.message_contains(needle))
    }
}

pub struct PollingRetriever<'a, B: ?Sized> {
    backend: &'a B,
    policy: RetryPolicy,
}

impl<'a, B: LogBackend + ?Sized> PollingRetriever<'a, B> {
    pub fn new(backend: &'a B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    #[instrument(
        skip(self, query),
        fields(filter = %query.filter_expression(), since = %describe_since(query), attempts)
    )]
    pub async fn retrieve_matching(&self, query: &LogQuery) -> Result<Retrieved, HarnessError> {
        // Give the ingestion pipeline a minimum window before the first query.
        tokio::time::sleep(self.policy.post_trigger_delay).await;

        let mut state = RetryState::new(self.policy.max_tries.max(1));
        loop {
            state.attempts_made += 1;
            tracing::debug!(attempt = state.attempts_made, "Querying logging backend");

            match self.poll_once(query).await {
                Ok(entries) => {
                    tracing::Span::current().record("attempts", state.attempts_made);
                    tracing::info!(
                        attempts = state.attempts_made,
                        num_entries = entries.len(),
                        "Found matching log entries"
                    );
                    return Ok(Retrieved { entries, state });
                }
                Err(PollError::NoMatchYet) => {
                    tracing::debug!(attempt = state.attempts_made, "No matching entries yet");
                    state.last_error = None;
                }
                Err(err @ PollError::Transport(_)) => {
                    tracing::warn!(attempt = state.attempts_made, "Log query failed: {err}");
                    state.last_error = Some(err.to_string());
                }
            }

            if state.exhausted() {
                break;
            }
            tokio::time::sleep(self.policy.inter_try_delay).await;
        }

        tracing::Span::current().record("attempts", state.attempts_made);
        tracing::warn!(
            attempts = state.attempts_made,
            last_error = state.last_error.as_deref().unwrap_or("none"),
            "Giving up on log query"
        );
        Err(HarnessError::LogsNotFound {
            filter: query.filter_expression().to_string(),
            attempts: state.attempts_made,
        })
    }

    async fn poll_once(&self, query: &LogQuery) -> Result<Vec<LogEntry>, PollError> {
        let entries = self.backend.list_entries(query.filter_expression()).await?;
        if entries.is_empty() {
            return Err(PollError::NoMatchYet);
        }
        Ok(entries)
    }
}
