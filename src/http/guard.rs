//! Per-client enforcement for arbitrary routes.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::debug;

use crate::ratelimit::{Denial, RateLimiter};

/// Identifier used when a request carries no client address headers.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derive a client identifier from proxy headers.
///
/// Takes the first `x-forwarded-for` hop, then `x-real-ip`, then falls back
/// to `"unknown"`. All headerless clients share one window.
pub fn client_identifier(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(self.body())).into_response();
        let headers = response.headers_mut();
        for (name, value) in self.headers() {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }
        response
    }
}

/// Middleware rejecting clients that exceed `limiter`'s quota.
///
/// Install with `axum::middleware::from_fn_with_state(limiter, enforce)`.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let identifier = client_identifier(request.headers());

    match limiter.check_or_deny(&identifier) {
        Some(denial) => {
            debug!(
                identifier = %identifier,
                path = %request.uri().path(),
                retry_after = denial.retry_after_secs,
                "Rejecting request over rate limit"
            );
            denial.into_response()
        }
        None => next.run(request).await,
    }
}
