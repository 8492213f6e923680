use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use logcheck::tracing_config::{init_tracing, shutdown_tracing};
use logcheck::{
    build_filter, make_fingerprint, run_all, EnvctlRunner, EnvironmentLifecycle, Harness,
    HarnessConfig, TriggerRequest,
};
use logging_client::LoggingClient;
use tracing::info;

#[derive(Parser)]
#[command(name = "logcheck")]
#[command(about = "Trigger logs in a deployed environment and check what reaches the backend")]
#[command(version)]
struct Cli {
    /// Deployment target (kubernetes, functions, cloudrun)
    #[arg(long, env = "ENVIRONMENT", global = true)]
    environment: Option<String>,

    /// Language of the deployed sample (nodejs, python)
    #[arg(long, env = "LANGUAGE", global = true)]
    language: Option<String>,

    /// Project whose logs are queried
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT", global = true)]
    project: Option<String>,

    /// Keep an already running environment and skip teardown
    #[arg(long, global = true)]
    no_clean: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the filter that would be used for a fingerprint
    Filter {
        /// Base text; a fresh identifier is appended
        text: String,
    },

    /// Fire a snippet and print the matching entries as JSON
    Trigger {
        /// Snippet name known to the deployed sample
        #[arg(default_value = "simplelog")]
        snippet: String,

        /// Base text of the fingerprint
        #[arg(long, default_value = "logcheck")]
        text: String,

        /// Extra snippet fields as key=value
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Run the scenario suite for the configured environment
    Check {
        /// Deploy before and tear down after the run
        #[arg(long)]
        manage: bool,
    },

    /// Deploy (or reuse) the environment
    Setup,

    /// Destroy the environment
    Teardown,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn load_config(cli: &Cli) -> HarnessConfig {
    let mut config = HarnessConfig::from_env();
    if let Some(environment) = &cli.environment {
        config.environment = environment.clone();
    }
    if let Some(language) = &cli.language {
        config.language = language.clone();
    }
    if let Some(project) = &cli.project {
        config.project_id = project.clone();
    }
    config.no_clean |= cli.no_clean;
    config
}

fn runner(config: &HarnessConfig) -> EnvctlRunner {
    EnvctlRunner::new(&config.envctl_path, &config.language, &config.environment)
}

fn harness(config: &HarnessConfig) -> Result<Harness<LoggingClient, EnvctlRunner>> {
    let client = LoggingClient::new(config.client_settings()?)?;
    Ok(Harness::from_config(config, client, runner(config))?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load env vars
    dotenv::dotenv().ok();

    init_tracing().context("failed to initialise tracing")?;

    let cli = Cli::parse();
    let config = load_config(&cli);
    let result = run(cli.command, &config).await;

    shutdown_tracing();
    result
}

async fn run(command: Commands, config: &HarnessConfig) -> Result<()> {
    match command {
        Commands::Filter { text } => {
            let query = build_filter(&make_fingerprint(&text), Utc::now(), config.filter_skew);
            println!("{}", query.filter_expression());
        }

        Commands::Trigger {
            snippet,
            text,
            fields,
        } => {
            let harness = harness(config)?;
            let request = fields
                .into_iter()
                .fold(TriggerRequest::new(text, snippet), |request, (key, value)| {
                    request.with_field(key, value)
                });
            let triggered = harness.trigger_and_retrieve(&request).await?;
            info!(
                fingerprint = %triggered.fingerprint,
                attempts = triggered.retrieved.state.attempts_made,
                rounds = triggered.rounds,
                "Entries retrieved"
            );
            println!("{}", serde_json::to_string_pretty(triggered.entries())?);
        }

        Commands::Check { manage } => {
            let harness = harness(config)?;
            let lifecycle = EnvironmentLifecycle::new(harness.runner(), config.no_clean);
            if manage {
                lifecycle.prepare().await?;
            }

            let results = run_all(&harness).await;

            if manage {
                lifecycle.teardown().await?;
            }

            let mut failed = 0;
            for (scenario, result) in &results {
                match result {
                    Ok(outcome) => println!("{:<32} {outcome}", scenario.name()),
                    Err(err) => {
                        failed += 1;
                        println!("{:<32} FAILED: {err}", scenario.name());
                    }
                }
            }
            if failed > 0 {
                bail!(
                    "{failed} of {} scenarios failed for {}/{}",
                    results.len(),
                    config.environment,
                    config.language
                );
            }
        }

        Commands::Setup => {
            config.validate()?;
            let runner = runner(config);
            let preparation = EnvironmentLifecycle::new(&runner, config.no_clean)
                .prepare()
                .await?;
            info!(?preparation, "Environment ready");
        }

        Commands::Teardown => {
            config.validate()?;
            let runner = runner(config);
            EnvironmentLifecycle::new(&runner, config.no_clean)
                .teardown()
                .await?;
        }
    }
    Ok(())
}
