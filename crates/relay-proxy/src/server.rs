//! Axum HTTP server: router, listener, graceful shutdown.

use std::sync::Arc;

use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::Router;
use bytes::Bytes;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::proxy::correlation;
use crate::proxy::error::ProxyError;
use crate::proxy::forward::{Forwarder, InboundRequest};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub forwarder: Forwarder,
}

/// Build the router: `/health` plus the relay under the mount path.
pub fn router(state: AppState) -> Router {
    let mount = state.config.server.mount_path.clone();
    let body_limit = state.config.backend.max_body_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route(&mount, relay_methods())
        .route(&format!("{mount}/"), relay_methods())
        .route(&format!("{mount}/{{*rest}}"), relay_methods())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Every relayed method routed to the same handler.
fn relay_methods() -> MethodRouter<Arc<AppState>> {
    get(handle_relay)
        .head(handle_relay)
        .post(handle_relay)
        .put(handle_relay)
        .patch(handle_relay)
        .delete(handle_relay)
        .options(handle_relay)
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let mount = state.config.server.mount_path.clone();
    let backend = state.forwarder.origin().to_string();

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(
        address = %listen_addr,
        mount = %mount,
        backend = %backend,
        "relay-proxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("relay-proxy shut down gracefully");
    Ok(())
}

/// Relay handler shared by every method under the mount path.
///
/// The body is buffered before forwarding; a rejected body (too large,
/// unreadable) never reaches the backend.
async fn handle_relay(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let correlation_id = correlation::generate_id();
    let span = relay_tracing::relay_request_span!(&correlation_id, &method, uri.path());

    async {
        let body = match body {
            Ok(body) => body,
            Err(rejection) => {
                let limit = state.config.backend.max_body_bytes;
                return ProxyError::from_body_rejection(rejection, limit).into_response();
            }
        };

        let inbound =
            InboundRequest::new(method, &uri, &state.config.server.mount_path, headers, body);

        match state.forwarder.forward(inbound, &correlation_id).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }
    .instrument(span)
    .await
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler, running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
