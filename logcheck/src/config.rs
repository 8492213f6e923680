use crate::error::HarnessError;
use logging_client::{ClientSettings, DEFAULT_API_URL};
use std::str::FromStr;
use std::time::Duration;

// Retry and timeout configuration
pub const DEFAULT_MAX_TRIES: u32 = 6;
pub const INTER_TRY_DELAY_SECS: u64 = 5;
pub const POST_TRIGGER_DELAY_SECS: u64 = 2;
pub const OUTER_TRIES: u32 = 2;
pub const OUTER_RETRY_DELAY_SECS: u64 = 2;
pub const FILTER_SKEW_SECS: u64 = 600; // 10 minutes

const ENVCTL_PATH: &str = "./envctl/envctl";
const LOGGING_PAGE_SIZE: u32 = 1000;
const LOGGING_MAX_PAGES: u32 = 10;

/// Inner polling budget for one retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_tries: u32,
    pub inter_try_delay: Duration,
    pub post_trigger_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            inter_try_delay: Duration::from_secs(INTER_TRY_DELAY_SECS),
            post_trigger_delay: Duration::from_secs(POST_TRIGGER_DELAY_SECS),
        }
    }
}

/// Budget for retrying a whole trigger-and-retrieve round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OuterRetry {
    pub tries: u32,
    pub delay: Duration,
    /// Fire the snippet again on each round. When false the later rounds only
    /// poll the original query again.
    pub retrigger: bool,
}

impl Default for OuterRetry {
    fn default() -> Self {
        Self {
            tries: OUTER_TRIES,
            delay: Duration::from_secs(OUTER_RETRY_DELAY_SECS),
            retrigger: true,
        }
    }
}

/// Unset, unparsable and out-of-range values all fall back to `default`.
fn parsed_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Deployment target, e.g. `kubernetes`, `functions`, `cloudrun`.
    pub environment: String,
    /// Language of the deployed sample, e.g. `nodejs`, `python`.
    pub language: String,
    pub project_id: String,
    pub logging_api_url: String,
    pub access_token: Option<String>,
    pub page_size: u32,
    pub max_pages: u32,
    pub envctl_path: String,
    pub retry: RetryPolicy,
    pub outer_retry: OuterRetry,
    pub filter_skew: Duration,
    /// Fail immediately when the trigger command reports a non-zero status.
    pub strict_trigger: bool,
    /// Keep an already deployed environment around between runs.
    pub no_clean: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            environment: String::new(),
            language: String::new(),
            project_id: String::new(),
            logging_api_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            page_size: LOGGING_PAGE_SIZE,
            max_pages: LOGGING_MAX_PAGES,
            envctl_path: ENVCTL_PATH.to_string(),
            retry: RetryPolicy::default(),
            outer_retry: OuterRetry::default(),
            filter_skew: Duration::from_secs(FILTER_SKEW_SECS),
            strict_trigger: false,
            no_clean: false,
        }
    }
}

impl HarnessConfig {
    /// Reads the configuration from the process environment, falling back to
    /// the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs_or = |key: &str, default: u64| Duration::from_secs(parsed_or(lookup(key), default));
        let flag = |key: &str| {
            lookup(key).is_some_and(|value| !value.is_empty() && value != "0" && value != "false")
        };

        Self {
            environment: lookup("ENVIRONMENT").unwrap_or_default(),
            language: lookup("LANGUAGE").unwrap_or_default(),
            project_id: lookup("GOOGLE_CLOUD_PROJECT")
                .or_else(|| lookup("PROJECT_ID"))
                .unwrap_or_default(),
            logging_api_url: lookup("LOGGING_API_URL").unwrap_or(defaults.logging_api_url),
            access_token: lookup("LOGGING_ACCESS_TOKEN").filter(|token| !token.is_empty()),
            page_size: parsed_or(lookup("LOGGING_PAGE_SIZE"), LOGGING_PAGE_SIZE),
            max_pages: parsed_or(lookup("LOGGING_MAX_PAGES"), LOGGING_MAX_PAGES),
            envctl_path: lookup("ENVCTL_PATH").unwrap_or(defaults.envctl_path),
            retry: RetryPolicy {
                max_tries: parsed_or(lookup("MAX_TRIES"), DEFAULT_MAX_TRIES),
                inter_try_delay: secs_or("INTER_TRY_DELAY_SECS", INTER_TRY_DELAY_SECS),
                post_trigger_delay: secs_or("POST_TRIGGER_DELAY_SECS", POST_TRIGGER_DELAY_SECS),
            },
            outer_retry: OuterRetry {
                tries: parsed_or(lookup("OUTER_TRIES"), OUTER_TRIES),
                delay: secs_or("OUTER_RETRY_DELAY_SECS", OUTER_RETRY_DELAY_SECS),
                retrigger: !lookup("OUTER_RETRIGGER").is_some_and(|value| value == "false"),
            },
            filter_skew: secs_or("FILTER_SKEW_SECS", FILTER_SKEW_SECS),
            strict_trigger: flag("STRICT_TRIGGER"),
            no_clean: flag("NO_CLEAN"),
        }
    }

    /// Setup-time validation. Nothing here is retried.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.environment.is_empty() {
            return Err(HarnessError::Configuration("environment not set".into()));
        }
        if self.language.is_empty() {
            return Err(HarnessError::Configuration("language not set".into()));
        }
        if self.retry.max_tries == 0 {
            return Err(HarnessError::Configuration("MAX_TRIES must be at least 1".into()));
        }
        Ok(())
    }

    pub fn client_settings(&self) -> Result<ClientSettings, HarnessError> {
        if self.project_id.is_empty() {
            return Err(HarnessError::Configuration(
                "GOOGLE_CLOUD_PROJECT is required to query the logging API".into(),
            ));
        }
        let mut settings = ClientSettings::new(self.project_id.clone());
        settings.api_url = self.logging_api_url.trim_end_matches('/').to_string();
        settings.access_token = self.access_token.clone();
        settings.page_size = self.page_size;
        settings.max_pages = self.max_pages;
        Ok(settings)
    }
}
