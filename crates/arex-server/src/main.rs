use anyhow::{Context, Result};
use arex_aws::{build_fetcher, AwsCredentials};
use arex_core::cache::MetricCache;
use arex_core::collector::CachedCollector;
use arex_core::config::ExporterConfig;
use arex_core::metrics::ExporterMetrics;
use arex_core::scheduler::spawn_refresh_loop;
use arex_server::app::{build_http_app, AppState};
use arex_server::flags::Flags;
use clap::Parser;
use prometheus::Registry;
use std::sync::Arc;
use tokio::signal;
use tokio::signal::unix::SignalKind;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let flags = Flags::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&flags.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting AWS resource exporter"
    );

    if !flags.telemetry_path.starts_with('/') || flags.telemetry_path == "/" {
        anyhow::bail!(
            "--web.telemetry-path must start with '/' and must not be the root path: {}",
            flags.telemetry_path
        );
    }

    let config = ExporterConfig::load(&flags.config_file)
        .with_context(|| format!("Failed to load {}", flags.config_file))?;
    let enabled = config.enabled_kinds();
    if enabled.is_empty() {
        tracing::warn!("No resource kinds enabled, only exporter self-metrics will be served");
    }

    let registry = Registry::new();
    let metrics = ExporterMetrics::new().context("Failed to build exporter self-metrics")?;
    registry
        .register(Box::new(metrics.clone()))
        .context("Failed to register exporter self-metrics")?;
    let cache = Arc::new(MetricCache::new());

    // Credentials are only required once at least one kind polls AWS.
    let mut refresh_handles = Vec::with_capacity(enabled.len());
    if !enabled.is_empty() {
        let credentials =
            Arc::new(AwsCredentials::from_env().context("Failed to resolve AWS credentials")?);
        for kind in enabled {
            let kind_config = config.kind(kind);
            let fetcher = build_fetcher(kind, kind_config, &credentials)
                .with_context(|| format!("Failed to build the {kind} fetcher"))?;
            let collector = CachedCollector::new(fetcher.as_ref(), kind_config, Arc::clone(&cache));
            registry
                .register(Box::new(collector))
                .with_context(|| format!("Failed to register the {kind} collector"))?;
            refresh_handles.push(spawn_refresh_loop(
                fetcher,
                kind_config.clone(),
                Arc::clone(&cache),
                metrics.clone(),
            ));
        }
    }

    let app = build_http_app(AppState {
        registry,
        metrics,
        telemetry_path: flags.telemetry_path.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&flags.listen_address)
        .await
        .with_context(|| format!("Failed to bind {}", flags.listen_address))?;
    tracing::info!(address = %flags.listen_address, path = %flags.telemetry_path, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Shutting down gracefully");
    for handle in refresh_handles {
        handle.abort();
    }
    tracing::info!("Exporter stopped");

    Ok(())
}

async fn shutdown_signal() {
    let terminate = async {
        match signal::unix::signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::error!(error = %error, "Failed to install the SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
