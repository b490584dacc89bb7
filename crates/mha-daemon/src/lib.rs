// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP front end for a stdio MCP server.
//!
//! Every `POST /mcp` request launches the configured command, writes the
//! request body to its stdin, and answers with the first line it prints.
//! See [`build_app`] for the routes and [`serve`] for the server loop.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// `POST /mcp` handler and request assembly.
pub mod handler;
/// Tracking of executions that still own a child process.
pub mod inflight;
/// Server lifecycle state machine.
pub mod lifecycle;
/// Request-id and logging middleware.
pub mod middleware;

pub use handler::build_request;
pub use inflight::{InFlight, InFlightGuard};
pub use lifecycle::{LifecycleError, LifecycleTransition, ServerLifecycle, ServerState};
pub use middleware::{REQUEST_ID_HEADER, RequestId, RequestLogger, request_id_middleware};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mha_config::AdapterConfig;
use mha_host::{CancelToken, ProcessExecutor};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Notify, RwLock};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};
use tracing::{info, warn};

/// Body returned for every subprocess failure; details go to the log only.
pub const EXECUTION_FAILED: &str = "Process execution failed";

/// How long [`serve`] waits for cancelled executions to reap their children
/// once the shutdown grace period has elapsed.
pub const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state for the HTTP server.
pub struct AppState {
    /// Validated startup configuration, never mutated.
    pub config: Arc<AdapterConfig>,
    /// Executor used for every request.
    pub executor: ProcessExecutor,
    /// Server lifecycle, reported by `/health`.
    pub lifecycle: RwLock<ServerLifecycle>,
    /// Parent of every execution context; cancelled when the grace period
    /// runs out.
    pub shutdown: CancelToken,
    /// Executions whose child has not been reaped yet.
    pub inflight: Arc<InFlight>,
}

impl AppState {
    /// State with a default executor and a fresh lifecycle.
    pub fn new(config: Arc<AdapterConfig>) -> Self {
        Self {
            config,
            executor: ProcessExecutor::new(),
            lifecycle: RwLock::new(ServerLifecycle::new()),
            shutdown: CancelToken::new(),
            inflight: Arc::new(InFlight::default()),
        }
    }

    /// Replace the executor.
    pub fn with_executor(mut self, executor: ProcessExecutor) -> Self {
        self.executor = executor;
        self
    }

    async fn transition(&self, to: ServerState, reason: &str) {
        if let Err(e) = self
            .lifecycle
            .write()
            .await
            .transition(to, Some(reason.to_string()))
        {
            warn!(target: "mha.daemon", error = %e, "lifecycle transition rejected");
        }
    }
}

/// An API error with HTTP status code and plain-text message.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code.
    pub status: StatusCode,
    /// Message sent as the response body.
    pub message: String,
}

impl ApiError {
    /// Create a new `ApiError` with the given status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 with `message`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// The generic 500 for any subprocess failure.
    pub fn execution_failed() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, EXECUTION_FAILED)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// Build the Axum router with all adapter routes and layers.
pub fn build_app(state: Arc<AppState>) -> Router {
    let envelope = state.config.timeouts.request_envelope();
    let routes = Router::new()
        .route("/mcp", post(handler::cmd_mcp))
        .route("/health", get(cmd_health))
        .with_state(state);
    with_layers(routes, envelope)
}

/// Wrap `routes` in the adapter's middleware: panics become 500, requests
/// running past `envelope` become 408, and every response is logged and
/// carries a request id.
pub fn with_layers(routes: Router, envelope: Duration) -> Router {
    routes
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            envelope,
        ))
        .layer(from_fn(RequestLogger::layer))
        .layer(from_fn(request_id_middleware))
}

async fn cmd_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let lifecycle = state.lifecycle.read().await;
    Json(json!({
        "status": "ok",
        "state": lifecycle.state(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": lifecycle.uptime().map(|d| d.as_secs()),
    }))
}

/// Serve `state` on `listener` until `shutdown` resolves.
///
/// After `shutdown` fires the listener stops accepting and in-flight
/// requests get the configured grace period. When it runs out,
/// [`AppState::shutdown`] is cancelled and `serve` waits up to
/// [`REAP_TIMEOUT`] for every child to be killed and reaped.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let grace = state.config.timeouts.shutdown_grace;
    let app = build_app(Arc::clone(&state));

    let triggered = Arc::new(Notify::new());
    let signal = {
        let triggered = Arc::clone(&triggered);
        async move {
            shutdown.await;
            triggered.notify_one();
        }
    };

    state.transition(ServerState::Serving, "listener bound").await;
    if let Ok(addr) = listener.local_addr() {
        info!(target: "mha.daemon", addr = %addr, command = %state.config.command, "serving");
    }

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .into_future();
    tokio::pin!(server);

    let result = tokio::select! {
        res = &mut server => res.context("server error"),
        _ = triggered.notified() => {
            state.transition(ServerState::ShuttingDown, "shutdown requested").await;
            info!(target: "mha.daemon", grace_secs = grace.as_secs(), "shutting down");
            match tokio::time::timeout(grace, &mut server).await {
                Ok(res) => res.context("server error"),
                Err(_) => {
                    warn!(
                        target: "mha.daemon",
                        in_flight = state.inflight.count(),
                        "grace period elapsed; cancelling in-flight executions"
                    );
                    state.shutdown.cancel();
                    if tokio::time::timeout(REAP_TIMEOUT, state.inflight.wait_idle())
                        .await
                        .is_err()
                    {
                        warn!(
                            target: "mha.daemon",
                            in_flight = state.inflight.count(),
                            "executions still running after cancellation"
                        );
                    }
                    Ok(())
                }
            }
        }
    };

    if state.lifecycle.read().await.state() == ServerState::Serving {
        state.transition(ServerState::ShuttingDown, "server exited").await;
    }
    state.transition(ServerState::Stopped, "server stopped").await;
    info!(target: "mha.daemon", "stopped");
    result
}
