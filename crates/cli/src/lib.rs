//! HTTP surface and operator commands for shutter.
//!
//! [`AppState`] wires the configured backends into the indexing coordinator, the projector
//! and both search paths; [`http_api::router`] exposes them over axum.

pub mod app;
pub mod config;
pub mod http_api;
pub mod metrics;

pub use app::{AppState, Backends};
pub use config::AppConfig;

use anyhow::{Context as AnyhowContext, Result};
use shutter_search_index::ProvisionReport;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Serves the API on `bind` while the projector drains the outbox in the background.
///
/// Both stop once `shutdown` resolves; in-flight requests are allowed to finish.
pub async fn serve(
    state: Arc<AppState>,
    bind: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    log_provision(&state.lexical.provision().await);

    let (stop_tx, stop_rx) = watch::channel(false);
    let projector = state.projector.clone();
    let projector_task = tokio::spawn(async move { projector.run(stop_rx).await });

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    log::info!("Serving shutter API on http://{bind}");

    let served = axum::serve(listener, http_api::router(state))
        .with_graceful_shutdown(shutdown)
        .await;

    let _ = stop_tx.send(true);
    if let Err(err) = projector_task.await {
        log::error!("Projector task ended abnormally: {err}");
    }
    served.context("HTTP server failed")
}

pub fn log_provision(report: &ProvisionReport) {
    let names = |list: &[shutter_search_index::Collection]| {
        list.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    if !report.created.is_empty() {
        log::info!("Created collections: {}", names(&report.created));
    }
    if !report.existing.is_empty() {
        log::debug!("Collections already present: {}", names(&report.existing));
    }
    for (collection, err) in &report.failed {
        log::warn!("Could not provision '{collection}': {err}");
    }
}
