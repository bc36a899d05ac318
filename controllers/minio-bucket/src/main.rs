//! MinIO Bucket Controller
//!
//! Watches MinIOBucket resources and keeps a bucket on the selected
//! MinIOInstance in line with each one:
//! - creates the bucket (plus access policy and index file) when missing
//! - reports readiness on the resource status
//! - on deletion, removes or keeps the bucket per `bucketFinalizePolicy`

mod backoff;
mod cache;
mod config;
mod connectivity;
mod controller;
mod error;
mod events;
mod queue;
mod reconcile_helpers;
mod reconciler;
mod resolver;
mod store;
mod tunnel;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting MinIO Bucket Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Workers: {}", config.workers);
    info!("  Connectivity: {:?}", config.mode);
    info!("  Resync period: {:?}", config.resync_period);
    info!("  Backend timeout: {:?}", config.backend_timeout);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone())?;

    let controller = Controller::new(&config, shutdown).await?;
    controller.run(config.workers).await?;

    Ok(())
}

/// Cancel `shutdown` on ctrl-c or SIGTERM
fn spawn_signal_handler(shutdown: CancellationToken) -> Result<(), ControllerError> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => {
                info!("Received ctrl-c");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM");
            }
        }
        shutdown.cancel();
    });
    Ok(())
}
