use crate::backend::LogBackend;
use crate::config::{HarnessConfig, OuterRetry, RetryPolicy};
use crate::error::HarnessError;
use crate::expectation::EnvironmentExpectation;
use crate::fingerprint::make_fingerprint;
use crate::query::{build_filter, LogQuery};
use crate::retriever::{PollingRetriever, Retrieved};
use crate::script::{Command, CommandRunner};
use crate::trigger::TriggerDispatcher;
use chrono::{DateTime, Utc};
use logging_client::LogEntry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// What to fire and how to tag it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRequest {
    pub log_text: String,
    pub snippet: String,
    pub append_uuid: bool,
    pub fields: BTreeMap<String, String>,
}

impl TriggerRequest {
    pub fn new(log_text: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            log_text: log_text.into(),
            snippet: snippet.into(),
            append_uuid: true,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Use `log_text` verbatim instead of appending a fresh identifier.
    pub fn without_uuid(mut self) -> Self {
        self.append_uuid = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Triggered {
    /// Fingerprint of the round that produced the entries.
    pub fingerprint: String,
    pub query: LogQuery,
    pub retrieved: Retrieved,
    /// Outer rounds used, starting at 1.
    pub rounds: u32,
}

impl Triggered {
    /// The most recent entry carrying this round's fingerprint.
    pub fn matched(&self) -> Option<&LogEntry> {
        self.retrieved.find_message(&self.fingerprint)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.retrieved.entries
    }
}

/// Wall-clock source for the lower time bound of a query.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Trigger, wait, poll, for one deployment target.
///
/// The backend and the script runner are injected so tests can swap both for
/// fakes. The harness keeps no state between calls; every call builds its own
/// fingerprint, query and retry state.
pub struct Harness<B, R> {
    backend: B,
    runner: R,
    expectation: EnvironmentExpectation,
    retry: RetryPolicy,
    outer_retry: OuterRetry,
    filter_skew: Duration,
    strict_trigger: bool,
    clock: Clock,
}

impl<B: LogBackend, R: CommandRunner> Harness<B, R> {
    pub fn new(backend: B, runner: R, expectation: EnvironmentExpectation) -> Self {
        let defaults = HarnessConfig::default();
        Self {
            backend,
            runner,
            expectation,
            retry: defaults.retry,
            outer_retry: defaults.outer_retry,
            filter_skew: defaults.filter_skew,
            strict_trigger: defaults.strict_trigger,
            clock: Arc::new(Utc::now),
        }
    }

    /// Validates `config` and picks the expectation preset for its target.
    pub fn from_config(config: &HarnessConfig, backend: B, runner: R) -> Result<Self, HarnessError> {
        config.validate()?;
        let expectation = EnvironmentExpectation::for_target(&config.environment, &config.language)?;
        Ok(Self::new(backend, runner, expectation)
            .with_retry(config.retry)
            .with_outer_retry(config.outer_retry)
            .with_filter_skew(config.filter_skew)
            .with_strict_trigger(config.strict_trigger))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_outer_retry(mut self, outer_retry: OuterRetry) -> Self {
        self.outer_retry = outer_retry;
        self
    }

    pub fn with_filter_skew(mut self, filter_skew: Duration) -> Self {
        self.filter_skew = filter_skew;
        self
    }

    pub fn with_strict_trigger(mut self, strict_trigger: bool) -> Self {
        self.strict_trigger = strict_trigger;
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn expectation(&self) -> &EnvironmentExpectation {
        &self.expectation
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Fires the snippet and polls until its entry shows up.
    ///
    /// On exhaustion the whole round is repeated up to `outer_retry.tries`
    /// times. With `retrigger` set each round fires the snippet again under a
    /// new fingerprint, so a slow first entry can still land alongside the
    /// second; [`Triggered::matched`] takes the latest one.
    #[instrument(skip(self, request), fields(snippet = %request.snippet, log_text = %request.log_text))]
    pub async fn trigger_and_retrieve(
        &self,
        request: &TriggerRequest,
    ) -> Result<Triggered, HarnessError> {
        let rounds = self.outer_retry.tries.max(1);
        let mut total_attempts = 0;
        let mut current: Option<(String, LogQuery)> = None;

        for round in 1..=rounds {
            let (fingerprint, query) = match current.take() {
                Some(previous) if !self.outer_retry.retrigger => previous,
                _ => self.fire(request).await?,
            };

            let retriever = PollingRetriever::new(&self.backend, self.retry);
            match retriever.retrieve_matching(&query).await {
                Ok(retrieved) => {
                    return Ok(Triggered {
                        fingerprint,
                        query,
                        retrieved,
                        rounds: round,
                    })
                }
                Err(err) if err.is_retryable() && round < rounds => {
                    if let HarnessError::LogsNotFound { attempts, .. } = &err {
                        total_attempts += *attempts;
                    }
                    tracing::warn!(
                        round,
                        "{err}, retrying in {:?}",
                        self.outer_retry.delay
                    );
                    tokio::time::sleep(self.outer_retry.delay).await;
                    current = Some((fingerprint, query));
                }
                Err(HarnessError::LogsNotFound { filter, attempts }) => {
                    return Err(HarnessError::LogsNotFound {
                        filter,
                        attempts: total_attempts + attempts,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        // `rounds >= 1`, so the loop always returns.
        Err(HarnessError::LogsNotFound {
            filter: current.map(|(_, query)| query.filter_expression().to_string()).unwrap_or_default(),
            attempts: total_attempts,
        })
    }

    /// Polls the environment's default filter, as reported by `envctl`.
    #[instrument(skip(self))]
    pub async fn retrieve_default(&self) -> Result<Retrieved, HarnessError> {
        let output = self.runner.run_command(Command::GetFilter, &[]).await?;
        if !output.success() {
            return Err(HarnessError::CommandFailed {
                command: Command::GetFilter,
                status: output.status,
                stderr: output.stderr,
            });
        }
        let query = LogQuery::from_raw(output.stdout.trim());
        PollingRetriever::new(&self.backend, self.retry)
            .retrieve_matching(&query)
            .await
    }

    async fn fire(&self, request: &TriggerRequest) -> Result<(String, LogQuery), HarnessError> {
        let fingerprint = if request.append_uuid {
            make_fingerprint(&request.log_text)
        } else {
            request.log_text.clone()
        };
        // The lower bound is taken at trigger time, not at query time.
        let now = (self.clock)();

        let mut fields = request.fields.clone();
        fields.insert("log_text".to_string(), fingerprint.clone());

        match TriggerDispatcher::new(&self.runner)
            .trigger(&request.snippet, &fields)
            .await
        {
            Ok(()) => {}
            Err(err @ HarnessError::TriggerFailed { .. }) if !self.strict_trigger => {
                // Polling exhaustion will surface the real failure.
                tracing::warn!("{err}; polling anyway");
            }
            Err(err) => return Err(err),
        }

        let query = build_filter(&fingerprint, now, self.filter_skew);
        Ok((fingerprint, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FILTER_SKEW_SECS;
    use crate::testing::FakeEnvironment;

    fn harness(fake: &FakeEnvironment) -> Harness<FakeEnvironment, FakeEnvironment> {
        Harness::new(
            fake.clone(),
            fake.clone(),
            EnvironmentExpectation::for_target("kubernetes", "python").unwrap(),
        )
    }

    fn fake(latency: u32) -> FakeEnvironment {
        FakeEnvironment::new(EnvironmentExpectation::for_target("kubernetes", "python").unwrap())
            .with_latency(latency)
    }

    #[tokio::test(start_paused = true)]
    async fn finds_entry_on_third_attempt() {
        let fake = fake(2);
        let triggered = harness(&fake)
            .trigger_and_retrieve(&TriggerRequest::new("test_receive_log", "simplelog"))
            .await
            .unwrap();

        assert_eq!(triggered.retrieved.state.attempts_made, 3);
        assert_eq!(triggered.rounds, 1);
        assert!(triggered.fingerprint.starts_with("test_receive_log "));
        assert_eq!(triggered.matched().unwrap().message(), Some(triggered.fingerprint.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn outer_round_retriggers_with_fresh_fingerprint() {
        let fake = fake(0);
        fake.fail_next_triggers(1);
        let triggered = harness(&fake)
            .trigger_and_retrieve(&TriggerRequest::new("flaky", "simplelog"))
            .await
            .unwrap();

        // Round one polls in vain, round two fires again and succeeds.
        assert_eq!(triggered.rounds, 2);
        let triggers = fake.triggers();
        assert_eq!(triggers.len(), 2);
        assert_ne!(triggers[0].fields["log_text"], triggers[1].fields["log_text"]);
        assert_eq!(triggered.fingerprint, triggers[1].fields["log_text"]);
    }

    #[tokio::test(start_paused = true)]
    async fn outer_round_without_retrigger_polls_same_query() {
        let fake = fake(7);
        let triggered = harness(&fake)
            .with_outer_retry(OuterRetry {
                retrigger: false,
                ..OuterRetry::default()
            })
            .trigger_and_retrieve(&TriggerRequest::new("slow", "simplelog"))
            .await
            .unwrap();

        assert_eq!(triggered.rounds, 2);
        assert_eq!(fake.triggers().len(), 1);
        assert_eq!(triggered.retrieved.state.attempts_made, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts_of_all_rounds() {
        let fake = fake(100);
        let err = harness(&fake)
            .trigger_and_retrieve(&TriggerRequest::new("never", "simplelog"))
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::LogsNotFound { attempts: 12, .. }));
        assert_eq!(fake.listings(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn strict_trigger_fails_fast() {
        let fake = fake(0);
        fake.fail_next_triggers(1);
        let err = harness(&fake)
            .with_strict_trigger(true)
            .trigger_and_retrieve(&TriggerRequest::new("flaky", "simplelog"))
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::TriggerFailed { .. }));
        assert_eq!(fake.listings(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn extra_fields_reach_the_snippet() {
        let fake = fake(0);
        harness(&fake)
            .trigger_and_retrieve(
                &TriggerRequest::new("test_severity", "simplelog").with_field("severity", "ALERT"),
            )
            .await
            .unwrap();

        let triggers = fake.triggers();
        let trigger = &triggers[0];
        assert_eq!(trigger.snippet, "simplelog");
        assert_eq!(trigger.fields["severity"], "ALERT");
    }

    #[tokio::test(start_paused = true)]
    async fn default_filter_comes_from_envctl() {
        let fake = fake(0);
        let harness = harness(&fake);
        harness
            .trigger_and_retrieve(&TriggerRequest::new("any", "simplelog"))
            .await
            .unwrap();

        let retrieved = harness.retrieve_default().await.unwrap();
        assert!(!retrieved.entries.is_empty());
        assert!(fake.commands().contains(&Command::GetFilter));
    }

    /// Wall clock that follows tokio's paused time from `base` on.
    fn paused_clock(base: DateTime<Utc>) -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
        let start = tokio::time::Instant::now();
        move || base + chrono::Duration::from_std(start.elapsed()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn time_bound_is_taken_at_trigger_time() {
        let fake = fake(2);
        let base = Utc::now();
        let started = tokio::time::Instant::now();
        let triggered = harness(&fake)
            .with_clock(paused_clock(base))
            .trigger_and_retrieve(&TriggerRequest::new("bounded", "simplelog"))
            .await
            .unwrap();

        // 12s of propagation and backoff passed, the bound did not move.
        assert_eq!(started.elapsed(), Duration::from_secs(12));
        assert_eq!(
            triggered.query.since(),
            Some(base - chrono::Duration::seconds(FILTER_SKEW_SECS as i64))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retriggered_round_takes_a_new_bound() {
        let fake = fake(0);
        fake.fail_next_triggers(1);
        let base = Utc::now();
        let triggered = harness(&fake)
            .with_clock(paused_clock(base))
            .trigger_and_retrieve(&TriggerRequest::new("bounded", "simplelog"))
            .await
            .unwrap();

        // Round two fires after 2s propagation, five 5s backoffs and the 2s
        // outer delay.
        assert_eq!(triggered.rounds, 2);
        assert_eq!(
            triggered.query.since(),
            Some(base + chrono::Duration::seconds(29 - FILTER_SKEW_SECS as i64))
        );
    }

    #[test]
    fn from_config_rejects_unknown_targets() {
        let fake = fake(0);
        let config = HarnessConfig {
            environment: "appengine".into(),
            language: "php".into(),
            ..HarnessConfig::default()
        };
        assert!(matches!(
            Harness::from_config(&config, fake.clone(), fake),
            Err(HarnessError::Configuration(_))
        ));
    }
}
