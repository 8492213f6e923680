//! Runs the scenario suite against a real deployment.
//!
//! Needs `ENVIRONMENT`, `LANGUAGE`, `GOOGLE_CLOUD_PROJECT` and either
//! `LOGGING_ACCESS_TOKEN` or a logging API emulator behind `LOGGING_API_URL`.
//! Run with `cargo test -p integration-tests --test live_test -- --ignored`.

use integration_tests::init_test_tracing;
use logcheck::{
    run_all, EnvctlRunner, EnvironmentLifecycle, Harness, HarnessConfig, TriggerRequest,
};
use logging_client::LoggingClient;

type TestResult<T> = Result<T, TestError>;

#[derive(Debug)]
struct TestError {
    message: String,
    operation: String,
}

impl TestError {
    fn new(operation: &str, message: String) -> Self {
        Self {
            operation: operation.to_string(),
            message,
        }
    }
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

fn live_harness(config: &HarnessConfig) -> TestResult<Harness<LoggingClient, EnvctlRunner>> {
    let settings = config
        .client_settings()
        .map_err(|e| TestError::new("client_settings", e.to_string()))?;
    let client =
        LoggingClient::new(settings).map_err(|e| TestError::new("client_setup", e.to_string()))?;
    let runner = EnvctlRunner::new(&config.envctl_path, &config.language, &config.environment);
    Harness::from_config(config, client, runner)
        .map_err(|e| TestError::new("harness_setup", e.to_string()))
}

#[tokio::test]
#[ignore = "needs a deployed environment"]
async fn test_live_receive_log() -> TestResult<()> {
    init_test_tracing();
    let config = HarnessConfig::from_env();
    let harness = live_harness(&config)?;

    let triggered = harness
        .trigger_and_retrieve(&TriggerRequest::new("test_receive_log", "simplelog"))
        .await
        .map_err(|e| TestError::new("trigger_and_retrieve", e.to_string()))?;

    if triggered.matched().is_none() {
        return Err(TestError::new(
            "match",
            format!("no entry carries {:?}", triggered.fingerprint),
        ));
    }
    println!(
        "✅ Found {} after {} attempts",
        triggered.fingerprint, triggered.retrieved.state.attempts_made
    );
    Ok(())
}

#[tokio::test]
#[ignore = "needs a deployed environment"]
async fn test_live_scenario_suite() -> TestResult<()> {
    init_test_tracing();
    let config = HarnessConfig::from_env();
    let harness = live_harness(&config)?;
    let lifecycle = EnvironmentLifecycle::new(harness.runner(), config.no_clean);

    lifecycle
        .prepare()
        .await
        .map_err(|e| TestError::new("prepare", e.to_string()))?;

    let results = run_all(&harness).await;

    lifecycle
        .teardown()
        .await
        .map_err(|e| TestError::new("teardown", e.to_string()))?;

    let failures = results
        .iter()
        .filter_map(|(scenario, result)| {
            result
                .as_ref()
                .err()
                .map(|err| format!("{}: {err}", scenario.name()))
        })
        .collect::<Vec<_>>();
    if !failures.is_empty() {
        return Err(TestError::new("scenarios", failures.join("\n")));
    }
    Ok(())
}
