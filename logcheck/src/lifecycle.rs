use crate::error::HarnessError;
use crate::script::{Command, CommandOutput, CommandRunner};
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    /// A running environment was kept because `NO_CLEAN` is set.
    Reused,
    /// The environment was (re)deployed and verified.
    Deployed,
}

/// Deploys and tears down the environment under test through `envctl`.
pub struct EnvironmentLifecycle<'a, R: ?Sized> {
    runner: &'a R,
    no_clean: bool,
}

impl<'a, R: CommandRunner + ?Sized> EnvironmentLifecycle<'a, R> {
    pub fn new(runner: &'a R, no_clean: bool) -> Self {
        Self { runner, no_clean }
    }

    /// Brings the environment up. A running environment is reset unless
    /// `no_clean` is set, in which case it is used as is.
    #[instrument(skip(self), fields(no_clean = self.no_clean))]
    pub async fn prepare(&self) -> Result<Preparation, HarnessError> {
        let verify = self.runner.run_command(Command::Verify, &[]).await?;
        if verify.success() {
            if self.no_clean {
                tracing::info!("Environment already running, reusing it");
                return Ok(Preparation::Reused);
            }
            tracing::info!("Environment already running, resetting it");
            self.run_checked(Command::Destroy).await?;
        }

        let deploy = self.runner.run_command(Command::Deploy, &[]).await?;
        if !deploy.success() {
            // A partial deploy can still verify; the verify step decides.
            tracing::error!(status = deploy.status, "Deploy failed: {}", deploy.stderr.trim());
        }

        self.run_checked(Command::Verify).await?;
        tracing::info!("Environment deployed");
        Ok(Preparation::Deployed)
    }

    /// Destroys the environment unless `no_clean` is set. Returns whether a
    /// teardown happened.
    #[instrument(skip(self), fields(no_clean = self.no_clean))]
    pub async fn teardown(&self) -> Result<bool, HarnessError> {
        if self.no_clean {
            tracing::info!("NO_CLEAN set, leaving environment running");
            return Ok(false);
        }
        self.run_checked(Command::Destroy).await?;
        Ok(true)
    }

    async fn run_checked(&self, command: Command) -> Result<CommandOutput, HarnessError> {
        let output = self.runner.run_command(command, &[]).await?;
        if !output.success() {
            return Err(HarnessError::CommandFailed {
                command,
                status: output.status,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}
