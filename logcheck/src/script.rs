//! The `envctl` script-runner collaborator.
//!
//! Each deployment target ships an `envctl` script that knows how to deploy,
//! verify, destroy and poke the sample application. The harness only ever
//! talks to it through [`CommandRunner`].

use crate::error::HarnessError;
use async_trait::async_trait;
use std::fmt;
use tokio::process;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Deploy,
    Destroy,
    Verify,
    Trigger,
    GetFilter,
}

impl Command {
    pub fn as_arg(&self) -> &'static str {
        match self {
            Command::Deploy => "deploy",
            Command::Destroy => "destroy",
            Command::Verify => "verify",
            Command::Trigger => "trigger",
            Command::GetFilter => "filter-string",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run_command(
        &self,
        command: Command,
        args: &[String],
    ) -> Result<CommandOutput, HarnessError>;
}

/// Runs `envctl <language> <environment> <command> [args...]`.
#[derive(Debug, Clone)]
pub struct EnvctlRunner {
    envctl_path: String,
    language: String,
    environment: String,
}

impl EnvctlRunner {
    pub fn new(
        envctl_path: impl Into<String>,
        language: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            envctl_path: envctl_path.into(),
            language: language.into(),
            environment: environment.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for EnvctlRunner {
    #[instrument(skip(self), fields(language = %self.language, environment = %self.environment))]
    async fn run_command(
        &self,
        command: Command,
        args: &[String],
    ) -> Result<CommandOutput, HarnessError> {
        let output = process::Command::new(&self.envctl_path)
            .arg(&self.language)
            .arg(&self.environment)
            .arg(command.as_arg())
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| HarnessError::Script { command, source })?;

        let result = CommandOutput {
            // Killed by a signal: no exit code to report.
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(status = result.status, "envctl {command} finished");
        Ok(result)
    }
}
