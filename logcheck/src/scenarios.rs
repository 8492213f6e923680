//! The shared scenario suite.
//!
//! Every deployment target runs the same scenarios through one [`Harness`];
//! what differs is the [`EnvironmentExpectation`](crate::expectation::EnvironmentExpectation)
//! the harness carries. A scenario whose capability the expectation does not
//! declare is skipped rather than failed.

use crate::assertion::{
    check_http_request, check_monitored_resource, check_severity, check_stdout_fields,
    AssertionReport, Outcome,
};
use crate::backend::LogBackend;
use crate::error::HarnessError;
use crate::harness::{Harness, TriggerRequest, Triggered};
use crate::script::CommandRunner;
use logging_client::{LogEntry, Severity};
use std::fmt;
use tracing::instrument;

/// Severities fired by the round trip, loudest first. `DEFAULT` goes last
/// since it checks for an absent field rather than a value.
pub const SEVERITY_ROUND_TRIP: [Severity; 9] = [
    Severity::Emergency,
    Severity::Alert,
    Severity::Critical,
    Severity::Error,
    Severity::Warning,
    Severity::Notice,
    Severity::Info,
    Severity::Debug,
    Severity::Default,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Passed,
    Skipped(&'static str),
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioOutcome::Passed => f.write_str("passed"),
            ScenarioOutcome::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

pub type ScenarioResult = Result<ScenarioOutcome, HarnessError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    ReceiveLog,
    ReceiveUnicodeLog,
    MonitoredResource,
    RequestLog,
    StdoutLog,
    SeverityRoundTrip,
    PythonLoggingReceiveLog,
}

impl Scenario {
    pub const ALL: [Scenario; 7] = [
        Scenario::ReceiveLog,
        Scenario::ReceiveUnicodeLog,
        Scenario::MonitoredResource,
        Scenario::RequestLog,
        Scenario::StdoutLog,
        Scenario::SeverityRoundTrip,
        Scenario::PythonLoggingReceiveLog,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::ReceiveLog => "test_receive_log",
            Scenario::ReceiveUnicodeLog => "test_receive_unicode_log",
            Scenario::MonitoredResource => "test_monitored_resource",
            Scenario::RequestLog => "test_request_log",
            Scenario::StdoutLog => "test_stdout_log",
            Scenario::SeverityRoundTrip => "test_severity",
            Scenario::PythonLoggingReceiveLog => "test_pylogging_receive_log",
        }
    }

    #[instrument(skip(harness), fields(scenario = self.name()))]
    pub async fn run<B: LogBackend, R: CommandRunner>(&self, harness: &Harness<B, R>) -> ScenarioResult {
        let expectation = harness.expectation();
        match self {
            Scenario::ReceiveLog => {
                receive(harness, self.name(), TriggerRequest::new(self.name(), "simplelog")).await
            }
            Scenario::ReceiveUnicodeLog => {
                let text = format!("{} 嗨 世界 😀", self.name());
                receive(harness, self.name(), TriggerRequest::new(text, "simplelog")).await
            }
            Scenario::MonitoredResource => {
                if expectation.resource.is_none() {
                    return Ok(ScenarioOutcome::Skipped("no resource expectation"));
                }
                let entry = fetch(harness, self.name(), TriggerRequest::new(self.name(), "simplelog")).await?;
                check_monitored_resource(&entry, expectation).into_result(self.name())?;
                Ok(ScenarioOutcome::Passed)
            }
            Scenario::RequestLog => {
                if expectation.request_props.is_none() {
                    return Ok(ScenarioOutcome::Skipped("no request log expectation"));
                }
                let entry = fetch(harness, self.name(), TriggerRequest::new(self.name(), "stdoutlog")).await?;
                check_http_request(&entry, expectation).into_result(self.name())?;
                Ok(ScenarioOutcome::Passed)
            }
            Scenario::StdoutLog => {
                if expectation.stdout.is_none() {
                    return Ok(ScenarioOutcome::Skipped("no stdout expectation"));
                }
                let entry = fetch(harness, self.name(), TriggerRequest::new(self.name(), "stdoutlog")).await?;
                check_stdout_fields(&entry, expectation).into_result(self.name())?;
                Ok(ScenarioOutcome::Passed)
            }
            Scenario::SeverityRoundTrip => {
                if !expectation.severity_round_trip {
                    return Ok(ScenarioOutcome::Skipped("severity is not configurable"));
                }
                for severity in SEVERITY_ROUND_TRIP {
                    severity_round_trip(harness, severity).await?;
                }
                Ok(ScenarioOutcome::Passed)
            }
            Scenario::PythonLoggingReceiveLog => {
                if !expectation.python_logging {
                    return Ok(ScenarioOutcome::Skipped("no python logging snippet"));
                }
                receive(harness, self.name(), TriggerRequest::new(self.name(), "pylogging")).await
            }
        }
    }
}

/// Fires `simplelog` at `severity` and checks what comes back.
pub async fn severity_round_trip<B: LogBackend, R: CommandRunner>(
    harness: &Harness<B, R>,
    severity: Severity,
) -> Result<(), HarnessError> {
    let name = Scenario::SeverityRoundTrip.name();
    let request = TriggerRequest::new(format!("{name}_{}", severity.as_str().to_lowercase()), "simplelog")
        .with_field("severity", severity.as_str());
    let entry = fetch(harness, name, request).await?;

    let check = check_severity(&entry, severity);
    if let Outcome::Fail(_) = check.outcome {
        return AssertionReport { checks: vec![check] }.into_result(name);
    }
    Ok(())
}

/// Runs every scenario in order. A failing scenario does not stop the rest.
pub async fn run_all<B: LogBackend, R: CommandRunner>(
    harness: &Harness<B, R>,
) -> Vec<(Scenario, ScenarioResult)> {
    let mut results = Vec::with_capacity(Scenario::ALL.len());
    for scenario in Scenario::ALL {
        let result = scenario.run(harness).await;
        match &result {
            Ok(outcome) => tracing::info!(scenario = scenario.name(), "{outcome}"),
            Err(err) => tracing::error!(scenario = scenario.name(), "failed: {err}"),
        }
        results.push((scenario, result));
    }
    results
}

async fn receive<B: LogBackend, R: CommandRunner>(
    harness: &Harness<B, R>,
    scenario: &'static str,
    request: TriggerRequest,
) -> ScenarioResult {
    fetch(harness, scenario, request).await?;
    Ok(ScenarioOutcome::Passed)
}

async fn fetch<B: LogBackend, R: CommandRunner>(
    harness: &Harness<B, R>,
    scenario: &'static str,
    request: TriggerRequest,
) -> Result<LogEntry, HarnessError> {
    let triggered = harness.trigger_and_retrieve(&request).await?;
    matched(&triggered, scenario).cloned()
}

fn matched<'t>(triggered: &'t Triggered, scenario: &'static str) -> Result<&'t LogEntry, HarnessError> {
    triggered.matched().ok_or_else(|| HarnessError::ScenarioFailed {
        scenario,
        reason: format!(
            "{} entries returned, none carry fingerprint {:?}",
            triggered.entries().len(),
            triggered.fingerprint
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::EnvironmentExpectation;
    use crate::testing::{FakeEnvironment, Reply, ScriptedBackend};
    use test_case::test_case;

    fn fake_harness(
        environment: &str,
        language: &str,
    ) -> (FakeEnvironment, Harness<FakeEnvironment, FakeEnvironment>) {
        let expectation = EnvironmentExpectation::for_target(environment, language).unwrap();
        let fake = FakeEnvironment::new(expectation.clone()).with_latency(1);
        (fake.clone(), Harness::new(fake.clone(), fake, expectation))
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
    async fn severity_survives_the_round_trip(severity: Severity) {
        let (fake, harness) = fake_harness("cloudrun", "python");
        severity_round_trip(&harness, severity).await.unwrap();
        assert_eq!(fake.triggers()[0].fields["severity"], severity.as_str());
    }

    #[tokio::test(start_paused = true)]
    async fn unicode_text_is_found() {
        let (fake, harness) = fake_harness("kubernetes", "python");
        let outcome = Scenario::ReceiveUnicodeLog.run(&harness).await.unwrap();
        assert_eq!(outcome, ScenarioOutcome::Passed);
        assert!(fake.triggers()[0].fields["log_text"].contains("嗨 世界 😀"));
    }

    #[tokio::test(start_paused = true)]
    async fn undeclared_capabilities_are_skipped() {
        let (fake, harness) = fake_harness("kubernetes", "python");
        for scenario in [Scenario::RequestLog, Scenario::StdoutLog] {
            assert!(matches!(
                scenario.run(&harness).await.unwrap(),
                ScenarioOutcome::Skipped(_)
            ));
        }
        assert!(fake.triggers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_suite_passes_on_kubernetes_nodejs() {
        let (_, harness) = fake_harness("kubernetes", "nodejs");
        let results = run_all(&harness).await;

        assert_eq!(results.len(), Scenario::ALL.len());
        for (scenario, result) in &results {
            let outcome = result.as_ref().unwrap();
            let expect_skip = matches!(
                scenario,
                Scenario::SeverityRoundTrip | Scenario::PythonLoggingReceiveLog
            );
            assert_eq!(
                matches!(outcome, ScenarioOutcome::Skipped(_)),
                expect_skip,
                "{}",
                scenario.name()
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_entries_do_not_count_as_a_match() {
        let expectation = EnvironmentExpectation::for_target("kubernetes", "python").unwrap();
        let backend = ScriptedBackend::new(vec![Reply::Entries(vec![LogEntry::text(
            "projects/p/logs/other",
            "someone else's line",
        )])]);
        let fake = FakeEnvironment::new(expectation.clone());
        let harness = Harness::new(backend, fake, expectation);

        let err = Scenario::ReceiveLog.run(&harness).await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::ScenarioFailed { scenario: "test_receive_log", .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_stdout_field_fails_the_scenario() {
        let expectation = EnvironmentExpectation::for_target("kubernetes", "nodejs").unwrap();
        let mut fake_view = expectation.clone();
        // The fake agent stops lifting the span id.
        if let Some(stdout) = fake_view.stdout.as_mut() {
            stdout.span_id = None;
        }
        let fake = FakeEnvironment::new(fake_view);
        let harness = Harness::new(fake.clone(), fake, expectation);

        let err = Scenario::StdoutLog.run(&harness).await.unwrap_err();
        match err {
            HarnessError::ScenarioFailed { reason, .. } => assert!(reason.contains("spanId")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
