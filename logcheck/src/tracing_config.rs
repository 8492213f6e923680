use opentelemetry::trace::{TraceError, TracerProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

#[derive(Debug, Error)]
pub enum TracingInitError {
    #[error("failed to create tracer provider: {0}")]
    TracerProvider(#[from] TraceError),
    #[error("failed to set subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Whether an OTLP collector is configured for this process.
fn otlp_endpoint_configured() -> bool {
    ["OTEL_EXPORTER_OTLP_ENDPOINT", "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT"]
        .iter()
        .any(|key| std::env::var_os(key).is_some_and(|value| !value.is_empty()))
}

/// Installs the global subscriber: a compact stdout layer filtered by
/// `RUST_LOG`, plus an OTLP exporter when a collector endpoint is set.
///
/// Must be called from within a Tokio runtime when exporting.
pub fn init_tracing() -> Result<(), TracingInitError> {
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    let tracing_opentelemetry_layer = if otlp_endpoint_configured() {
        // Assumes a GRPC endpoint (e.g port 4317)
        let exporter = opentelemetry_otlp::new_exporter().tonic();

        let tracer_provider = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(
                opentelemetry_sdk::trace::Config::default()
                    .with_resource(opentelemetry_sdk::Resource::default()),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;

        opentelemetry::global::set_tracer_provider(tracer_provider.clone());

        // Only affects what is exported, not what is printed.
        let tracing_level_filter = tracing_subscriber::filter::Targets::new()
            .with_target("logcheck", tracing::Level::TRACE)
            .with_target("logging_client", tracing::Level::TRACE)
            .with_target("reqwest_tracing", tracing::Level::INFO)
            .with_target("hyper_util", tracing::Level::INFO)
            .with_target("h2", tracing::Level::WARN)
            .with_default(tracing::Level::INFO);

        Some(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer("logcheck"))
                .with_filter(tracing_level_filter),
        )
    } else {
        None
    };

    let format = tracing_subscriber::fmt::format()
        .with_level(true)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact();

    let fmt_layer = tracing_subscriber::fmt::layer().event_format(format);

    let subscriber = tracing_subscriber::Registry::default()
        .with(fmt_layer.with_filter(tracing_subscriber::EnvFilter::from_default_env()))
        .with(tracing_opentelemetry_layer);

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Flushes pending spans. A no-op when no exporter was installed.
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}
