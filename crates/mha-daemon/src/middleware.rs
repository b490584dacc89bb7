// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request-id and request-logging middleware.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Response header carrying the request id.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// A unique request identifier, available as an Axum extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Generate a [`RequestId`] for each request and echo it in the
/// `x-request-id` response header.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    req.extensions_mut().insert(id);
    let mut resp = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    resp
}

/// Logs method, path, status and duration for every request.
pub struct RequestLogger;

impl RequestLogger {
    /// Axum-compatible middleware function.
    pub async fn layer(req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let request_id = req
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.to_string())
            .unwrap_or_default();
        let start = Instant::now();

        let resp = next.run(req).await;

        info!(
            target: "mha.http",
            request_id = %request_id,
            http.method = %method,
            http.path = %path,
            http.status = resp.status().as_u16(),
            http.duration_ms = start.elapsed().as_millis() as u64,
            "request completed"
        );
        resp
    }
}
