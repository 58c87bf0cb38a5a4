pub mod http;

use crate::config::Config;
use crate::credentials::CredentialResolver;
use crate::media::YtDlpExtractor;
use crate::pipeline::DownloadOrchestrator;
use crate::storage::{EnvProviderSelector, ProviderSelector};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

pub use http::{router, AppState};

pub async fn run(config: Config) -> Result<()> {
    let selector: Arc<dyn ProviderSelector> =
        Arc::new(EnvProviderSelector::new(&config.storage.staging_dir));

    let extractor = YtDlpExtractor::new(
        config.download.ytdlp_binary.clone(),
        &config.download.output_dir,
        config.download.format.clone(),
    );
    if !extractor.test_availability().await {
        warn!("yt-dlp is not available, download jobs will fail until it is installed");
    }

    let credentials = Arc::new(CredentialResolver::new(
        &config.download.cookie_path,
        config.download.cookie_source.clone(),
        selector.clone(),
    ));

    let orchestrator = Arc::new(DownloadOrchestrator::new(
        Arc::new(extractor),
        selector,
        credentials,
        config.download.contract,
    ));

    if config.server.api_key.is_none() {
        warn!("No API key configured, requests will not be authenticated");
    }

    let state = AppState::new(orchestrator, config.server.api_key.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    info!("Listening on {}", config.server.listen);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    state.drain_jobs().await;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
