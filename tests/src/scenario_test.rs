use integration_tests::{fake_harness, TARGETS};
use logcheck::scenarios::severity_round_trip;
use logcheck::{run_all, Command, EnvironmentLifecycle, HarnessError, Preparation, Scenario};
use logcheck::{ScenarioOutcome, TriggerRequest};
use logging_client::{Payload, Severity};
use std::time::Duration;
use test_case::test_case;

#[test_case("functions", "nodejs")]
#[test_case("kubernetes", "nodejs")]
#[test_case("kubernetes", "python")]
#[test_case("cloudrun", "python")]
#[tokio::test(start_paused = true)]
async fn suite_passes_against_fake_environment(environment: &str, language: &str) {
    let (_, harness) = fake_harness(environment, language, 2);

    for (scenario, result) in run_all(&harness).await {
        if let Err(err) = result {
            panic!("{environment}/{language} {}: {err}", scenario.name());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn receive_log_is_found_on_third_attempt() {
    let (fake, harness) = fake_harness("kubernetes", "nodejs", 2);
    let started = tokio::time::Instant::now();

    let triggered = harness
        .trigger_and_retrieve(&TriggerRequest::new("test_receive_log", "stdoutlog"))
        .await
        .unwrap();

    assert_eq!(triggered.retrieved.state.attempts_made, 3);
    assert_eq!(fake.listings(), 3);
    // 2s propagation window plus two 5s backoffs.
    assert_eq!(started.elapsed(), Duration::from_secs(12));

    let entry = triggered.matched().expect("matched entry");
    assert!(matches!(entry.payload, Payload::Json(_)));
    assert!(entry.message_contains("test_receive_log "));
    assert!(triggered
        .query
        .filter_expression()
        .starts_with(&format!("\"{}\" AND timestamp > \"", triggered.fingerprint)));
}

#[tokio::test(start_paused = true)]
async fn one_transport_error_is_absorbed() {
    let (fake, harness) = fake_harness("cloudrun", "python", 0);
    fake.fail_next_listings(1);

    let triggered = harness
        .trigger_and_retrieve(&TriggerRequest::new("test_receive_log", "simplelog"))
        .await
        .unwrap();

    assert_eq!(triggered.retrieved.state.attempts_made, 2);
    assert!(triggered.retrieved.state.last_error.is_some());
    assert!(triggered.matched().is_some());
}

#[tokio::test(start_paused = true)]
async fn missing_logs_surface_after_every_round() {
    let (fake, harness) = fake_harness("kubernetes", "python", 1_000);

    let err = Scenario::ReceiveLog.run(&harness).await.unwrap_err();

    assert!(err.is_retryable());
    match err {
        HarnessError::LogsNotFound { attempts, filter } => {
            assert_eq!(attempts, 12);
            assert!(filter.contains("test_receive_log "));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fake.triggers().len(), 2);
}

#[test_case(Severity::Emergency)]
#[test_case(Severity::Alert)]
#[test_case(Severity::Critical)]
#[test_case(Severity::Error)]
#[test_case(Severity::Warning)]
#[test_case(Severity::Notice)]
#[test_case(Severity::Info)]
#[test_case(Severity::Debug)]
#[test_case(Severity::Default)]
#[tokio::test(start_paused = true)]
async fn severity_round_trip_on_kubernetes_python(severity: Severity) {
    let (_, harness) = fake_harness("kubernetes", "python", 1);
    severity_round_trip(&harness, severity).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unicode_log_keeps_its_characters() {
    let (fake, harness) = fake_harness("cloudrun", "python", 0);

    let outcome = Scenario::ReceiveUnicodeLog.run(&harness).await.unwrap();

    assert_eq!(outcome, ScenarioOutcome::Passed);
    let triggers = fake.triggers();
    let log_text = &triggers[0].fields["log_text"];
    assert!(log_text.starts_with("test_receive_unicode_log 嗨 世界 😀 "));
}

#[tokio::test(start_paused = true)]
async fn functions_skip_python_only_scenarios() {
    let (_, harness) = fake_harness("functions", "nodejs", 0);

    for scenario in [Scenario::SeverityRoundTrip, Scenario::PythonLoggingReceiveLog] {
        assert!(matches!(
            scenario.run(&harness).await.unwrap(),
            ScenarioOutcome::Skipped(_)
        ));
    }
}

#[tokio::test]
async fn no_clean_keeps_a_running_environment() {
    for (environment, language) in TARGETS {
        let (fake, harness) = fake_harness(environment, language, 0);
        let lifecycle = EnvironmentLifecycle::new(harness.runner(), true);

        assert_eq!(lifecycle.prepare().await.unwrap(), Preparation::Deployed);
        assert_eq!(lifecycle.prepare().await.unwrap(), Preparation::Reused);
        assert!(!lifecycle.teardown().await.unwrap());
        assert!(fake.is_deployed());
        assert!(!fake.commands().contains(&Command::Destroy));
    }
}
