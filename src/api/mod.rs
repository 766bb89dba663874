//! HTTP API server for the voice bridge

pub mod health;

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::FutureExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::bridge::Bridge;
use crate::protocol::DirectiveError;
use crate::registry::SharedRegistry;
use crate::{Error, Result};

/// Shared state for API handlers
pub struct ApiState {
    pub bridge: Bridge,
    pub registry: SharedRegistry,
    /// Names of the configured backend connections
    pub connections: Vec<String>,
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>, timeout: Duration) -> Router {
    Router::new()
        .route("/", post(directive))
        .route("/alexa", post(directive))
        .with_state(state.clone())
        .merge(health::router())
        .merge(health::ready_router(state))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}

/// Answer one directive or skill request
async fn directive(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "request body is not JSON");
            return Json(DirectiveError::UnsupportedOperation.to_response()).into_response();
        }
    };

    match AssertUnwindSafe(state.bridge.handle(value)).catch_unwind().await {
        Ok(response) => Json(response).into_response(),
        Err(_) => {
            tracing::error!("request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    addr: SocketAddr,
    timeout: Duration,
}

impl ApiServer {
    #[must_use]
    pub const fn new(state: Arc<ApiState>, addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            state,
            addr,
            timeout,
        }
    }

    /// Run the API server until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server on {}: {e}", self.addr)))?;

        tracing::info!(addr = %self.addr, "API server listening");

        axum::serve(listener, router(self.state, self.timeout))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}
