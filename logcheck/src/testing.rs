//! In-process stand-ins for the logging backend and the `envctl` script.
//!
//! [`ScriptedBackend`] replays a fixed list of replies. [`FakeEnvironment`]
//! plays a whole deployment target: it turns triggers into entries shaped
//! after an [`EnvironmentExpectation`], and only exposes them after a
//! configurable number of listings to mimic ingestion latency.

use crate::backend::LogBackend;
use crate::error::{BackendError, HarnessError};
use crate::expectation::EnvironmentExpectation;
use crate::script::{Command, CommandOutput, CommandRunner};
use crate::trigger::parse_trigger_args;
use async_trait::async_trait;
use chrono::Utc;
use logging_client::{LogEntry, MonitoredResource, Severity};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub enum Reply {
    Empty,
    Fail(String),
    Entries(Vec<LogEntry>),
}

/// Answers listings from a queue; an exhausted queue answers empty.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    filters: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            filters: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        lock(&self.filters).len()
    }

    pub fn filters(&self) -> Vec<String> {
        lock(&self.filters).clone()
    }
}

#[async_trait]
impl LogBackend for ScriptedBackend {
    async fn list_entries(&self, filter: &str) -> Result<Vec<LogEntry>, BackendError> {
        lock(&self.filters).push(filter.to_string());
        match lock(&self.replies).pop_front().unwrap_or(Reply::Empty) {
            Reply::Empty => Ok(Vec::new()),
            Reply::Fail(reason) => Err(BackendError::Unavailable(reason)),
            Reply::Entries(entries) => Ok(entries),
        }
    }
}

/// Records every command and answers all of them with the same output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    output: CommandOutput,
    calls: Mutex<Vec<(Command, Vec<String>)>>,
}

impl RecordingRunner {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing(status: i32, stderr: &str) -> Self {
        Self {
            output: CommandOutput {
                status,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Command, Vec<String>)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run_command(
        &self,
        command: Command,
        args: &[String],
    ) -> Result<CommandOutput, HarnessError> {
        lock(&self.calls).push((command, args.to_vec()));
        Ok(self.output.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRecord {
    pub snippet: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug)]
struct Pending {
    listings_left: u32,
    entry: LogEntry,
}

#[derive(Debug)]
struct FakeState {
    expectation: EnvironmentExpectation,
    project_id: String,
    visible_after: u32,
    pending: Vec<Pending>,
    visible: Vec<LogEntry>,
    transport_failures: u32,
    trigger_failures: u32,
    deployed: bool,
    commands: Vec<Command>,
    triggers: Vec<TriggerRecord>,
    listings: usize,
}

/// A deployment target in a box. Cloning shares the same state, so one clone
/// can serve as the backend and another as the script runner.
#[derive(Debug, Clone)]
pub struct FakeEnvironment {
    state: Arc<Mutex<FakeState>>,
}

impl FakeEnvironment {
    pub fn new(expectation: EnvironmentExpectation) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                expectation,
                project_id: "envtest-project".to_string(),
                visible_after: 0,
                pending: Vec::new(),
                visible: Vec::new(),
                transport_failures: 0,
                trigger_failures: 0,
                deployed: false,
                commands: Vec::new(),
                triggers: Vec::new(),
                listings: 0,
            })),
        }
    }

    /// Entries become visible on the `n + 1`-th listing after their trigger.
    pub fn with_latency(self, listings: u32) -> Self {
        lock(&self.state).visible_after = listings;
        self
    }

    pub fn deployed(self) -> Self {
        lock(&self.state).deployed = true;
        self
    }

    /// The next `n` listings fail with a transport error.
    pub fn fail_next_listings(&self, n: u32) {
        lock(&self.state).transport_failures = n;
    }

    /// The next `n` triggers exit non-zero without emitting anything.
    pub fn fail_next_triggers(&self, n: u32) {
        lock(&self.state).trigger_failures = n;
    }

    /// Adds an entry that is not related to any trigger.
    pub fn inject(&self, entry: LogEntry) {
        lock(&self.state).visible.push(entry);
    }

    pub fn triggers(&self) -> Vec<TriggerRecord> {
        lock(&self.state).triggers.clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        lock(&self.state).commands.clone()
    }

    pub fn listings(&self) -> usize {
        lock(&self.state).listings
    }

    pub fn is_deployed(&self) -> bool {
        lock(&self.state).deployed
    }
}

impl FakeState {
    fn emit(&self, snippet: &str, fields: &BTreeMap<String, String>) -> Result<LogEntry, String> {
        let text = fields.get("log_text").cloned().unwrap_or_default();
        let severity = |default: Option<Severity>| -> Result<Option<Severity>, String> {
            match fields.get("severity") {
                Some(value) => value
                    .parse::<Severity>()
                    .map(|severity| Some(severity).filter(|s| *s != Severity::Default))
                    .map_err(|err| err.to_string()),
                None => Ok(default),
            }
        };

        let mut entry = match snippet {
            "simplelog" => {
                let log_name = fields.get("log_name").map_or("my-log", String::as_str);
                let mut entry = LogEntry::text(self.log_name(log_name), text);
                entry.severity = severity(None)?;
                entry
            }
            "pylogging" => {
                let mut entry = LogEntry::text(self.log_name("python"), text);
                entry.severity = severity(Some(Severity::Warning))?;
                entry
            }
            "stdoutlog" => self.stdout_entry(text),
            other => return Err(format!("unknown snippet '{other}'")),
        };
        entry.timestamp = Some(Utc::now());
        if entry.resource.is_none() {
            entry.resource = self.resource();
        }
        Ok(entry)
    }

    fn log_name(&self, name: &str) -> String {
        format!("projects/{}/logs/{name}", self.project_id)
    }

    fn resource(&self) -> Option<MonitoredResource> {
        self.expectation.resource.as_ref().map(|resource| MonitoredResource {
            kind: resource.kind.clone(),
            labels: resource
                .labels
                .iter()
                .map(|key| (key.clone(), format!("fake-{key}")))
                .collect(),
        })
    }

    /// A JSON line written to stdout, with whatever the agent is known to lift.
    fn stdout_entry(&self, text: String) -> LogEntry {
        let stdout = self.expectation.stdout.clone().unwrap_or_default();

        let mut payload = Map::new();
        payload.insert("message".into(), Value::String(text));
        for prop in &stdout.payload_props {
            payload
                .entry(prop.clone())
                .or_insert_with(|| json!(format!("unlifted-{prop}")));
        }

        let mut entry = LogEntry::json(
            stdout.log_name.clone().unwrap_or_else(|| self.log_name("stdout")),
            payload,
        );
        entry.severity = stdout.severity;
        entry.insert_id = stdout.insert_id.clone();
        entry.trace = stdout
            .trace_contains
            .as_ref()
            .map(|trace| format!("projects/{}{trace}", self.project_id));
        entry.span_id = stdout.span_id.clone();
        entry.trace_sampled = stdout.trace_sampled;
        entry.labels = Some(
            stdout
                .labels
                .iter()
                .map(|key| (key.clone(), format!("fake-{key}")))
                .collect::<HashMap<_, _>>(),
        );
        entry.http_request = self.expectation.request_props.as_ref().map(|props| {
            props
                .iter()
                .map(|prop| (prop.clone(), json!(format!("fake-{prop}"))))
                .collect()
        });
        entry
    }

    fn list(&mut self, filter: &str) -> Result<Vec<LogEntry>, BackendError> {
        self.listings += 1;

        let mut still_pending = Vec::new();
        for mut pending in self.pending.drain(..) {
            if pending.listings_left == 0 {
                self.visible.push(pending.entry);
            } else {
                pending.listings_left -= 1;
                still_pending.push(pending);
            }
        }
        self.pending = still_pending;

        if self.transport_failures > 0 {
            self.transport_failures -= 1;
            return Err(BackendError::Unavailable("fake transport failure".into()));
        }

        Ok(self
            .visible
            .iter()
            .filter(|entry| matches_filter(entry, filter))
            .cloned()
            .collect())
    }
}

/// Understands the two filter shapes the harness produces: a leading quoted
/// substring, or a `resource.type="..."` default filter.
fn matches_filter(entry: &LogEntry, filter: &str) -> bool {
    if let Some(needle) = leading_quoted(filter) {
        return entry.message_contains(&needle);
    }
    if let Some(kind) = filter
        .split_once("resource.type=\"")
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(kind, _)| kind)
    {
        return entry.resource.as_ref().is_some_and(|resource| resource.kind == kind);
    }
    true
}

fn leading_quoted(filter: &str) -> Option<String> {
    let mut chars = filter.trim_start().strip_prefix('"')?.chars();
    let mut value = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?),
            '"' => return Some(value),
            c => value.push(c),
        }
    }
    None
}

#[async_trait]
impl LogBackend for FakeEnvironment {
    async fn list_entries(&self, filter: &str) -> Result<Vec<LogEntry>, BackendError> {
        lock(&self.state).list(filter)
    }
}

#[async_trait]
impl CommandRunner for FakeEnvironment {
    async fn run_command(
        &self,
        command: Command,
        args: &[String],
    ) -> Result<CommandOutput, HarnessError> {
        let mut state = lock(&self.state);
        state.commands.push(command);

        let ok = |stdout: String| CommandOutput {
            status: 0,
            stdout,
            stderr: String::new(),
        };
        let failed = |stderr: String| CommandOutput {
            status: 1,
            stdout: String::new(),
            stderr,
        };

        let output = match command {
            Command::Deploy => {
                state.deployed = true;
                ok(String::new())
            }
            Command::Destroy => {
                state.deployed = false;
                ok(String::new())
            }
            Command::Verify if state.deployed => ok("environment is running".into()),
            Command::Verify => failed("environment is not deployed".into()),
            Command::GetFilter => match &state.expectation.resource {
                Some(resource) => ok(format!("resource.type=\"{}\"", resource.kind)),
                None => ok(String::new()),
            },
            Command::Trigger => {
                let snippet = args.first().cloned().unwrap_or_default();
                let fields = args.get(1).map(|raw| parse_trigger_args(raw)).unwrap_or_default();
                state.triggers.push(TriggerRecord {
                    snippet: snippet.clone(),
                    fields: fields.clone(),
                });

                if state.trigger_failures > 0 {
                    state.trigger_failures -= 1;
                    failed("trigger failed".into())
                } else {
                    match state.emit(&snippet, &fields) {
                        Ok(entry) => {
                            let listings_left = state.visible_after;
                            state.pending.push(Pending {
                                listings_left,
                                entry,
                            });
                            ok(String::new())
                        }
                        Err(reason) => failed(reason),
                    }
                }
            }
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k8s_python() -> FakeEnvironment {
        FakeEnvironment::new(EnvironmentExpectation::for_target("kubernetes", "python").unwrap())
    }

    fn trigger_args(text: &str) -> Vec<String> {
        vec!["simplelog".into(), format!("log_text=\"{text}\"")]
    }

    #[tokio::test]
    async fn entries_appear_after_configured_latency() {
        let fake = k8s_python().with_latency(2);
        fake.run_command(Command::Trigger, &trigger_args("hello 1"))
            .await
            .unwrap();

        assert!(fake.list_entries("\"hello 1\"").await.unwrap().is_empty());
        assert!(fake.list_entries("\"hello 1\"").await.unwrap().is_empty());
        let entries = fake.list_entries("\"hello 1\"").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource.as_ref().unwrap().kind, "k8s_container");
    }

    #[tokio::test]
    async fn quoted_filter_selects_by_message() {
        let fake = k8s_python();
        fake.inject(LogEntry::text("l", "unrelated"));
        fake.run_command(Command::Trigger, &trigger_args("mine 7"))
            .await
            .unwrap();

        let entries = fake
            .list_entries("\"mine 7\" AND timestamp > \"2021-01-01T00:00:00.000000+00:00\"")
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message(), Some("mine 7"));
    }

    #[tokio::test]
    async fn unknown_snippet_exits_non_zero() {
        let fake = k8s_python();
        let output = fake
            .run_command(Command::Trigger, &["nosuchlog".to_string()])
            .await
            .unwrap();
        assert_eq!(output.status, 1);
        assert!(output.stderr.contains("nosuchlog"));
    }

    #[test]
    fn leading_quoted_unescapes() {
        assert_eq!(leading_quoted("\"a \\\"b\\\"\" AND x").as_deref(), Some("a \"b\""));
        assert_eq!(leading_quoted("resource.type=\"x\""), None);
    }

    #[tokio::test]
    async fn scripted_backend_replays_then_goes_empty() {
        let backend = ScriptedBackend::new(vec![Reply::Fail("boom".into())]);
        assert!(backend.list_entries("f").await.is_err());
        assert!(backend.list_entries("f").await.unwrap().is_empty());
        assert_eq!(backend.filters(), vec!["f".to_string(), "f".to_string()]);
    }
}
