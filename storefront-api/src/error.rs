/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// Middleware and handlers return `Result<T, ApiError>`, which converts to the
/// matching status code and a JSON body:
///
/// ```json
/// { "error": "rate_limit_exceeded", "message": "Too many requests, please try again later" }
/// ```
///
/// # Example
///
/// ```
/// use storefront_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler(id: u64) -> ApiResult<Json<serde_json::Value>> {
///     if id == 0 {
///         return Err(ApiError::NotFound("Product not found".to_string()));
///     }
///     Ok(Json(json!({ "id": id })))
/// }
/// ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message returned with every 429 response
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests, please try again later";

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
///
/// Covers the responses produced by the edge itself: unknown `/api` paths and
/// rate limit rejections. Mounted resource handlers may return it as well.
#[derive(Debug)]
pub enum ApiError {
    /// Not found (404)
    NotFound(String),

    /// Too many requests (429)
    RateLimitExceeded {
        retry_after: u64,
        message: String,
    },
}

impl ApiError {
    /// Rejection for a client over its rate limit
    pub fn rate_limited(retry_after: u64) -> Self {
        ApiError::RateLimitExceeded {
            retry_after,
            message: RATE_LIMIT_MESSAGE.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "not_found", "rate_limit_exceeded")
    pub error: String,

    /// Human-readable error message
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::RateLimitExceeded { message, .. } => {
                write!(f, "Rate limit exceeded: {}", message)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (error_code, message, retry_after) = match self {
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::RateLimitExceeded {
                retry_after,
                message,
            } => ("rate_limit_exceeded", message, Some(retry_after)),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
