//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use voxrelay_core::Error;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "code": self.status.as_str(),
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::Validation(_) | Error::Audio(_) => ApiError::bad_request(err.to_string()),
            Error::ResourceUnavailable(_) => ApiError::unavailable(err.to_string()),
            _ => ApiError::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_statuses() {
        let e: ApiError = Error::Validation("empty text".to_string()).into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);

        let e: ApiError = Error::Audio("not a wav".to_string()).into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);

        let e: ApiError = Error::ResourceUnavailable("load failed".to_string()).into();
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);

        let e: ApiError = Error::Transient("hiccup".to_string()).into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
