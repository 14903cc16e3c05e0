//! Rate limit HTTP service implementation.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use super::guard::client_identifier;
use crate::error::{Result, WindowGuardError};
use crate::ratelimit::{Denial, RateLimiterBackend};

/// Body of `POST /v1/ratelimit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Policy to check against
    pub policy: String,
    /// Identifier to charge; derived from proxy headers when absent
    #[serde(default)]
    pub identifier: Option<String>,
}

/// Build the service router over `backend`.
pub fn router<R: RateLimiterBackend + 'static>(backend: Arc<R>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/ratelimit", post(check::<R>))
        .route("/v1/ratelimit/{policy}/{identifier}", delete(reset::<R>))
        .with_state(backend)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Charge one request to an identifier under a policy.
#[instrument(skip_all)]
async fn check<R: RateLimiterBackend + 'static>(
    State(backend): State<Arc<R>>,
    headers: HeaderMap,
    Json(request): Json<CheckRequest>,
) -> Result<Response> {
    if request.policy.is_empty() {
        warn!("Received rate limit request with empty policy");
        return Err(WindowGuardError::InvalidRequest("policy is required".to_string()));
    }

    let identifier = match request.identifier {
        Some(id) if id.is_empty() => {
            warn!("Received rate limit request with empty identifier");
            return Err(WindowGuardError::InvalidRequest(
                "identifier must not be empty".to_string(),
            ));
        }
        Some(id) => id,
        None => client_identifier(&headers),
    };

    let result = backend.check_rate_limit(&request.policy, &identifier).await?;

    debug!(
        policy = %request.policy,
        identifier = %identifier,
        success = result.success,
        remaining = result.remaining,
        "Rate limit decision"
    );

    if result.success {
        return Ok((StatusCode::OK, Json(result)).into_response());
    }

    let limit = backend.limit(&request.policy).await?;
    let now = backend.now_millis(&request.policy).await?;
    Ok(Denial::new(result, limit, now).into_response())
}

/// Discard an identifier's window under a policy.
#[instrument(skip_all)]
async fn reset<R: RateLimiterBackend + 'static>(
    State(backend): State<Arc<R>>,
    Path((policy, identifier)): Path<(String, String)>,
) -> Result<StatusCode> {
    backend.reset(&policy, &identifier).await?;
    Ok(StatusCode::NO_CONTENT)
}

impl IntoResponse for WindowGuardError {
    fn into_response(self) -> Response {
        let status = match &self {
            WindowGuardError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            WindowGuardError::UnknownPolicy(_) => StatusCode::NOT_FOUND,
            WindowGuardError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            WindowGuardError::Config(_) | WindowGuardError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut response = (status, Json(serde_json::json!({ "error": message }))).into_response();
        if let WindowGuardError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from(retry_after_secs));
        }
        response
    }
}
