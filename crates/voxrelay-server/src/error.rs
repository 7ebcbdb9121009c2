//! API error handling and HTTP outcome mapping
//!
//! Rate-limit denials are routine traffic shaping, not failures: they get
//! their advisory headers and at most a debug log. Configuration problems
//! are operator errors and log loudly. Exhausted transient failures come
//! back 503 with wording distinct from validation so callers know a retry
//! can help.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error, warn};
use voxrelay_core::Error;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub retry: Option<RetryAdvice>,
}

#[derive(Debug)]
pub struct RetryAdvice {
    pub limit: u32,
    pub reset_at: u64,
    pub retry_after_secs: u64,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
            retry: None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
            retry: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        if let Some(retry) = &self.retry {
            headers.insert("X-RateLimit-Limit", header_value(retry.limit.to_string()));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
            headers.insert("X-RateLimit-Reset", header_value(retry.reset_at.to_string()));
            headers.insert(
                "Retry-After",
                header_value(retry.retry_after_secs.to_string()),
            );
        }
        let body = Json(json!({
            "error": {
                "message": self.message,
                "code": self.status.as_str(),
            }
        }));
        (self.status, headers, body).into_response()
    }
}

fn header_value(s: String) -> HeaderValue {
    HeaderValue::from_str(&s).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(_) | Error::Audio(_) => ApiError::bad_request(err.to_string()),
            Error::RateLimited {
                limit,
                reset_at,
                retry_after_secs,
                ..
            } => {
                debug!("request rejected by rate limiter: {err}");
                Self {
                    status: StatusCode::TOO_MANY_REQUESTS,
                    message: "Rate limit exceeded. Please retry later.".to_string(),
                    retry: Some(RetryAdvice {
                        limit,
                        reset_at,
                        retry_after_secs,
                    }),
                }
            }
            Error::Config(_) => {
                error!("dispatch misconfigured: {err}");
                Self {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    message: err.to_string(),
                    retry: None,
                }
            }
            Error::Transient(_) | Error::ResourceUnavailable(_) => {
                warn!("inference backend unavailable: {err}");
                Self {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    message: "Inference backend unavailable. Please try again later.".to_string(),
                    retry: None,
                }
            }
            Error::Redis(_) => ApiError::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_carries_retry_advice() {
        let e: ApiError = Error::RateLimited {
            limit: 10,
            window_secs: 60,
            reset_at: 1_700_000_000,
            retry_after_secs: 42,
        }
        .into();
        assert_eq!(e.status, StatusCode::TOO_MANY_REQUESTS);
        let retry = e.retry.unwrap();
        assert_eq!(retry.limit, 10);
        assert_eq!(retry.retry_after_secs, 42);
    }

    #[test]
    fn transient_maps_to_retryable_503_wording() {
        let e: ApiError = Error::Transient("socket reset".to_string()).into();
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(e.message.contains("try again"));

        let v: ApiError = Error::Validation("text too long".to_string()).into();
        assert_eq!(v.status, StatusCode::BAD_REQUEST);
        assert!(!v.message.contains("try again"));
    }
}
