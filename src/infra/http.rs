//! HTTP surface: the page fallback plus the operator health endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::ServerSettings;
use crate::dispatch::DispatchError;
use crate::engine::Engine;
use crate::modules::PageRequest;

use super::error::InfraError;

#[derive(Clone)]
pub struct HttpState {
    pub engine: Arc<Engine>,
}

/// Build the service router: `/healthz` for operators, everything else is a
/// page request.
pub fn build_router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .fallback(dispatch_page)
        .with_state(HttpState { engine })
}

/// Bind and serve until the shutdown signal fires, then drain in-flight
/// connections up to the configured graceful shutdown window.
pub async fn serve(server: &ServerSettings, engine: Arc<Engine>) -> Result<(), InfraError> {
    let listener = TcpListener::bind(server.addr).await?;
    info!(addr = %server.addr, "Listening");

    let (signal_tx, mut signal_rx) = tokio::sync::watch::channel(false);
    let shutdown = async move {
        shutdown_signal().await;
        let _ = signal_tx.send(true);
    };

    let drain_limit = server.graceful_shutdown;
    let drain_deadline = async move {
        while !*signal_rx.borrow() {
            if signal_rx.changed().await.is_err() {
                return std::future::pending::<()>().await;
            }
        }
        tokio::time::sleep(drain_limit).await;
    };

    let serve_future = axum::serve(listener, build_router(engine)).with_graceful_shutdown(shutdown);

    tokio::select! {
        result = serve_future => result.map_err(InfraError::from),
        _ = drain_deadline => {
            warn!("Graceful shutdown window elapsed; closing remaining connections");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to install shutdown signal handler");
        return;
    }
    info!("Shutdown signal received");
}

async fn health(State(state): State<HttpState>) -> Response {
    let status = state.engine.status().await;
    Json(status).into_response()
}

async fn dispatch_page(
    State(state): State<HttpState>,
    Query(params): Query<BTreeMap<String, String>>,
    uri: Uri,
) -> Response {
    let request = PageRequest::new(uri.path()).with_params(params);

    match state.engine.dispatcher().dispatch(request).await {
        Ok(outcome) if outcome.report.primary_failure => {
            (StatusCode::INTERNAL_SERVER_ERROR, Html(outcome.page.html)).into_response()
        }
        Ok(outcome) => Html(outcome.page.html).into_response(),
        Err(DispatchError::NoModules) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "no modules are enabled",
        )
            .into_response(),
    }
}
