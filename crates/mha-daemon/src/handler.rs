// SPDX-License-Identifier: MIT OR Apache-2.0
//! `POST /mcp`: one request, one child process, one response line.

use crate::middleware::RequestId;
use crate::{ApiError, AppState};
use axum::{
    Extension,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use mha_config::AdapterConfig;
use mha_headers::{map_headers, parse_arg_headers, parse_env_headers};
use mha_host::{CancelToken, ExecContext, ExecError, ExecutionRequest};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Build the per-request execution from the shared config and the request
/// headers. The shared config is only read; every field is copied.
///
/// Environment precedence, lowest first: defaults, `X-MCP-Env-*` (when
/// enabled), mapped headers. Arguments: base, mapped, then `X-MCP-Arg*`.
pub fn build_request(config: &AdapterConfig, headers: &HeaderMap, input: Bytes) -> ExecutionRequest {
    let mapped = map_headers(headers, &config.header_env, &config.header_args);

    let mut env = config.default_env.clone();
    let mut args = config.args.clone();
    args.extend(mapped.args);
    if config.passthrough.enabled {
        env.extend(parse_env_headers(headers));
        args.extend(parse_arg_headers(headers, &config.passthrough.arg_templates));
    }
    env.extend(mapped.env);

    ExecutionRequest {
        command: config.command.clone(),
        args,
        env,
        input: input.to_vec(),
    }
}

async fn read_body(state: &AppState, body: Body) -> Result<Bytes, ApiError> {
    let limit = state.config.max_body_bytes;
    match tokio::time::timeout(state.config.timeouts.read, axum::body::to_bytes(body, limit)).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => {
            debug!(target: "mha.http", error = %e, limit, "request body rejected");
            Err(ApiError::bad_request("Failed to read request body"))
        }
        Err(_) => {
            debug!(target: "mha.http", "request body read timed out");
            Err(ApiError::bad_request("Failed to read request body"))
        }
    }
}

pub(crate) async fn cmd_mcp(
    State(state): State<Arc<AppState>>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let request_id = request_id.map(|Extension(id)| id.0.to_string()).unwrap_or_default();
    let input = read_body(&state, body).await?;
    let req = build_request(&state.config, &headers, input);

    // The child runs on its own task so kill + reap finish even if this
    // handler is dropped; dropping the guard cancels that task's context.
    // Server shutdown cancels it through the parent token.
    let token = CancelToken::new();
    let guard = token.drop_guard();
    let ctx = ExecContext::new(token)
        .with_parent(state.shutdown.clone())
        .with_timeout(state.config.timeouts.process);
    let executor = state.executor.clone();
    let command = req.command.clone();
    let registered = state.inflight.enter();
    let joined = tokio::spawn(async move {
        let _registered = registered;
        executor.execute(&ctx, &req).await
    })
    .await;
    guard.disarm();

    let result = match joined {
        Ok(result) => result,
        Err(e) => {
            error!(target: "mha.http", request_id = %request_id, error = %e, "execution task failed");
            return Err(ApiError::execution_failed());
        }
    };

    match result {
        Ok(out) => {
            if !out.stderr.is_empty() {
                debug!(
                    target: "mha.exec.stderr",
                    request_id = %request_id,
                    pid = ?out.pid,
                    stderr = %out.stderr,
                    "process stderr"
                );
            }
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                out.line,
            )
                .into_response())
        }
        Err(err) => {
            log_failure(&request_id, &command, &err);
            Err(ApiError::execution_failed())
        }
    }
}

fn log_failure(request_id: &str, command: &str, err: &ExecError) {
    let stderr = err.stderr().unwrap_or_default();
    if err.is_cancelled() {
        warn!(
            target: "mha.http",
            request_id = %request_id,
            command = %command,
            kind = err.kind().as_str(),
            error = %err,
            stderr = %stderr,
            "process execution cancelled"
        );
    } else {
        error!(
            target: "mha.http",
            request_id = %request_id,
            command = %command,
            kind = err.kind().as_str(),
            error = %err,
            stderr = %stderr,
            "process execution failed"
        );
    }
}
