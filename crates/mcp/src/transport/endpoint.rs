//! Streamable HTTP binding.
//!
//! `POST /mcp` runs the full gated pipeline: the [`AuthLayer`] rejects the
//! request before any handler runs unless the [`Authenticator`] yields a
//! [`Grant`]. `/health` and the well-known discovery paths need no
//! credentials.

use axum::{
    Extension, Json, Router,
    body::{Body, Bytes},
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http::StatusCode;
use smcp_auth::{AuthLayer, Authenticator, Grant, oauth::metadata_router};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::{
    config::{HEALTH_PATH, MCP_PATH, ServerConfig},
    dispatch::{Dispatcher, Outcome},
};

use super::cors::CorsLayer;

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Reply { status, response } => (status, Json(response)).into_response(),
            Outcome::Accepted => {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::ACCEPTED;
                response
            }
        }
    }
}

/// Build the application router.
pub fn router<A>(config: &ServerConfig, authenticator: A, dispatcher: Dispatcher) -> Router
where
    A: Authenticator<Claims = Grant>,
{
    let gate = AuthLayer::new(authenticator).with_resource_server(config.resource_server());
    let protected = Router::new()
        .route(MCP_PATH, post(mcp).layer(gate))
        .with_state(Arc::new(dispatcher));

    let router = Router::new()
        .route(HEALTH_PATH, get(health))
        .merge(metadata_router(config.metadata()))
        .merge(protected);

    if config.cors {
        router.layer(CorsLayer)
    } else {
        router
    }
}

async fn mcp(
    State(dispatcher): State<Arc<Dispatcher>>,
    Extension(grant): Extension<Grant>,
    body: Bytes,
) -> Outcome {
    dispatcher.dispatch(&grant, &body).await
}

async fn health() -> String {
    format!(
        "Secure MCP server running deployed: UTC: {}, use {MCP_PATH} path to use the tools",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
    )
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves on Ctrl-C.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
