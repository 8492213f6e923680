//! Trigger-and-retrieve harness for checking that deployed code ends up in
//! the logging backend with the expected metadata.

pub mod assertion;
pub mod backend;
pub mod config;
pub mod error;
pub mod expectation;
pub mod fingerprint;
pub mod harness;
pub mod lifecycle;
pub mod query;
pub mod retriever;
pub mod scenarios;
pub mod script;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tracing_config;
pub mod trigger;

pub use backend::LogBackend;
pub use config::{HarnessConfig, OuterRetry, RetryPolicy};
pub use error::{BackendError, HarnessError, PollError};
pub use expectation::{EnvironmentExpectation, ResourceExpectation, StdoutExpectation};
pub use fingerprint::make_fingerprint;
pub use harness::{Clock, Harness, TriggerRequest, Triggered};
pub use lifecycle::{EnvironmentLifecycle, Preparation};
pub use query::{build_filter, LogQuery};
pub use retriever::{PollingRetriever, Retrieved, RetryState};
pub use scenarios::{run_all, Scenario, ScenarioOutcome, ScenarioResult};
pub use script::{Command, CommandOutput, CommandRunner, EnvctlRunner};
pub use trigger::TriggerDispatcher;
