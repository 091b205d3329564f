//! HTTP server for the relay
//!
//! Every method and path is caught by a single fallback handler, snapshotted,
//! and routed through the [`FailoverRouter`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use hyper::body::Bytes;
use relay_common::error::{RelayError, Result};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::failover::{FailoverRouter, RoutingOutcome};
use crate::forwarder::RequestSnapshot;

/// Body returned to the caller when both pools are exhausted.
pub const EXHAUSTED_MESSAGE: &str = "All RPCs are reaching their ratelimits.";

/// Largest inbound body buffered for forwarding.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// HTTP server in front of the failover router.
pub struct HttpServer {
    router: Arc<FailoverRouter>,
}

impl HttpServer {
    pub fn new(router: Arc<FailoverRouter>) -> Self {
        Self { router }
    }

    /// Builds the axum app. Exposed so tests can serve it on their own listener.
    pub fn app(&self) -> axum::Router {
        axum::Router::new()
            .fallback(relay)
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(TraceLayer::new_for_http())
            .with_state(self.router.clone())
    }

    /// Runs the HTTP server.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "0.0.0.0:8080")
    ///
    /// # Returns
    /// - `Ok(())` - Server shut down cleanly
    /// - `Err(RelayError)` - Server failed to bind or run
    ///
    /// # Behavior
    /// - Binds to the specified address
    /// - Serves until Ctrl-C, then drains in-flight requests
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// # Arguments
    /// * `listener` - Bound TCP listener
    /// * `shutdown` - Future whose completion starts graceful shutdown
    ///
    /// # Returns
    /// - `Ok(())` - Server shut down cleanly
    /// - `Err(RelayError)` - Serving failed
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            "Load balancer started on http://{}",
            listener.local_addr()
                .map_err(|e| RelayError::Transport(format!("Failed to get local addr: {}", e)))?
        );

        axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| RelayError::Transport(format!("Server error: {}", e)))?;

        info!("Load balancer stopped");
        Ok(())
    }
}

/// Routes any inbound request.
async fn relay(
    State(router): State<Arc<FailoverRouter>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let request = RequestSnapshot::new(method, path_and_query, headers, body);

    match router.route(&request).await {
        RoutingOutcome::Relayed(upstream) => {
            (upstream.status, upstream.headers, upstream.body).into_response()
        }
        RoutingOutcome::PrimaryExhausted | RoutingOutcome::FallbackExhausted => {
            (StatusCode::INTERNAL_SERVER_ERROR, EXHAUSTED_MESSAGE).into_response()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
