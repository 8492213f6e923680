use crate::error::HarnessError;
use crate::script::{Command, CommandRunner};
use std::collections::BTreeMap;
use tracing::instrument;

/// Fires snippets in the deployed sample application.
///
/// The dispatcher never retries. A non-zero exit status comes back as
/// [`HarnessError::TriggerFailed`] and the caller decides what it means.
pub struct TriggerDispatcher<'a, R: ?Sized> {
    runner: &'a R,
}

impl<'a, R: CommandRunner + ?Sized> TriggerDispatcher<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    #[instrument(skip(self, fields), fields(num_fields = fields.len()))]
    pub async fn trigger(
        &self,
        snippet: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), HarnessError> {
        let args = vec![snippet.to_string(), format_trigger_args(fields)];
        let output = self.runner.run_command(Command::Trigger, &args).await?;
        if !output.success() {
            return Err(HarnessError::TriggerFailed {
                snippet: snippet.to_string(),
                status: output.status,
                stderr: output.stderr,
            });
        }
        tracing::debug!("Triggered snippet {snippet}");
        Ok(())
    }
}

/// `k1="v1",k2="v2"`, the form `envctl trigger` forwards to the snippet.
pub fn format_trigger_args(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}=\"{value}\""))
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`format_trigger_args`] for values without embedded quotes.
pub fn parse_trigger_args(args: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let mut rest = args;
    while let Some((key, after_key)) = rest.split_once("=\"") {
        let Some(end) = after_key.find('"') else {
            break;
        };
        fields.insert(
            key.trim_start_matches(',').trim().to_string(),
            after_key[..end].to_string(),
        );
        rest = &after_key[end + 1..];
    }
    fields
}
