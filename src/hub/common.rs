//! Common types for REST API responses and errors

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// `errorCode` of a successful response
pub const ERROR_CODE_OK: i32 = 0;

/// `errorCode` of a failed domain check
pub const ERROR_CODE_UNREACHABLE: i32 = 500;

/// `errorCode` for unknown routes
pub const ERROR_CODE_NOT_FOUND: i32 = 404;

/// `errorCode` for a known route hit with the wrong method
pub const ERROR_CODE_METHOD_NOT_ALLOWED: i32 = 405;

/// Uniform response envelope
///
/// Business-level failures are reported through `error_code` and `message`
/// with a 200 transport status; `data` is omitted when there is none.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub error_code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            error_code: ERROR_CODE_OK,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(error_code: i32, message: impl Into<String>) -> Self {
        ApiResponse {
            error_code,
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self) {
            Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
            Err(e) => {
                error!("Error encoding response body: {}", e);
                ApiError::Internal(e.to_string()).into_response()
            }
        }
    }
}

/// Transport-level API error, rendered as plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Request body is not valid JSON or lacks a required field
    MalformedRequest(String),
    /// Response could not be produced
    Internal(String),
}

impl ApiError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ApiError::MalformedRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::MalformedRequest(m) | ApiError::Internal(m) => m,
        };
        (status, message).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// `POST /check` request body
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// URL to probe, used as given
    pub domain: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope() {
        let response = ApiResponse::success(json!({ "finalUrl": "http://example.com/" }));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["errorCode"], 0);
        assert_eq!(value["message"], "success");
        assert_eq!(value["data"]["finalUrl"], "http://example.com/");
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let response = ApiResponse::<()>::error(ERROR_CODE_UNREACHABLE, "domain unreachable: boom");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["errorCode"], 500);
        assert_eq!(value["message"], "domain unreachable: boom");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_api_error_status() {
        assert_eq!(ApiError::malformed("bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Internal("oops".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_check_request_parsing() {
        let request: CheckRequest = serde_json::from_str(r#"{"domain": "https://example.com"}"#).unwrap();
        assert_eq!(request.domain, "https://example.com");

        assert!(serde_json::from_str::<CheckRequest>(r#"{"host": "example.com"}"#).is_err());
    }
}
