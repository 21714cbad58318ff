// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composition root for the gateway daemon.
//!
//! Wires config → store → ingestion pipeline → webhook dispatcher →
//! tenant manager → ops listener, then parks on the shutdown signal and
//! tears the stack down in reverse order.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use wagate_config::WagateConfig;
use wagate_core::{IngestSink, UpstreamConnector, WagateError};
use wagate_ingest::{IngestService, IngestSettings};
use wagate_session::{SessionSettings, TenantManager};
use wagate_storage::SqliteStore;
use wagate_webhook::WebhookDispatcher;

use crate::ops;

/// Grace period for workers to flush their current batch on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(300);

/// Runs the gateway until the cancellation token fires.
pub async fn run(
    config: WagateConfig,
    connector: Arc<dyn UpstreamConnector>,
    shutdown: CancellationToken,
) -> Result<(), WagateError> {
    let data_dir = &config.agent.data_dir;
    tokio::fs::create_dir_all(data_dir).await?;

    let db_path = config.storage.resolved_database_path(data_dir);
    let store = Arc::new(
        SqliteStore::open(&db_path.to_string_lossy()).await?,
    );
    info!(path = %db_path.display(), "store opened");

    let ingest = IngestService::new(
        IngestSettings::from_config(&config.ingest, data_dir),
        store.clone(),
    )
    .await?;
    ingest.spawn().await;

    let notifier = Arc::new(WebhookDispatcher::new(store.clone())?);
    let manager = TenantManager::new(
        std::path::Path::new(data_dir).join("sessions"),
        connector,
        store.clone(),
        ingest.clone() as Arc<dyn IngestSink>,
        notifier,
        SessionSettings::from_config(&config.session),
    );
    let restored = manager.auto_connect_all().await;
    info!(restored, "tenant sessions restored from disk");

    let ops_task = ops::serve(&config.ops, ingest.clone()).await?;

    shutdown.cancelled().await;
    info!("shutdown signal received");

    manager.shutdown().await;
    ingest.shutdown(SHUTDOWN_GRACE).await;
    ops_task.abort();
    store.close().await?;
    info!("gateway stopped");
    Ok(())
}

/// Installs handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] cancelled when either signal arrives.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    tracing::error!(error = %err, "cannot install SIGTERM handler");
                    let _ = ctrl_c.await;
                    token_clone.cancel();
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}
