// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ops HTTP surface: unauthenticated health, readiness, and metrics
//! endpoints consumed by the REST collaborator and process supervisors.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::task::JoinHandle;
use tracing::info;

use wagate_config::OpsConfig;
use wagate_core::WagateError;
use wagate_ingest::IngestService;

/// Builds the ops router.
pub fn router(ingest: Arc<IngestService>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/ready", get(get_ready))
        .route("/metrics", get(get_metrics))
        .with_state(ingest)
}

/// Binds the ops listener and serves it in the background.
pub async fn serve(
    config: &OpsConfig,
    ingest: Arc<IngestService>,
) -> Result<JoinHandle<()>, WagateError> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WagateError::Config(format!("cannot bind ops listener to {addr}: {e}")))?;
    info!(addr = %addr, "ops listener started");

    let app = router(ingest);
    Ok(tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "ops server error");
        }
    }))
}

/// 200 iff the store is reachable.
async fn get_health(State(ingest): State<Arc<IngestService>>) -> impl IntoResponse {
    let report = ingest.health().await;
    let code = if report.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

/// 200 iff the store is reachable and the queue is below threshold.
async fn get_ready(State(ingest): State<Arc<IngestService>>) -> impl IntoResponse {
    let report = ingest.ready().await;
    let code = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

/// JSON metrics snapshot.
async fn get_metrics(State(ingest): State<Arc<IngestService>>) -> impl IntoResponse {
    Json(ingest.snapshot())
}
