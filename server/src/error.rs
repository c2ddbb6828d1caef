//! HTTP mapping for service errors.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use iepscan::error::ScanError;

/// Error body returned by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub kind: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

pub fn status_for(err: &ScanError) -> StatusCode {
    match err {
        ScanError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        ScanError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ScanError::NotFound(_) => StatusCode::NOT_FOUND,
        ScanError::AlreadyInProgress => StatusCode::CONFLICT,
        ScanError::Upstream(_) => StatusCode::BAD_GATEWAY,
        ScanError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            log::error!("Request failed: {}", err);
        }
        // Database details stay in the log.
        let message = match &err {
            ScanError::Database(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        Self {
            status,
            kind: err.kind(),
            message,
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self {
            status: err.status(),
            kind: "invalid_input",
            message: err.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        Self {
            status: err.status(),
            kind: "invalid_input",
            message: err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
            kind: self.kind,
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ScanError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
            (ScanError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (ScanError::NotFound("Scan not found".into()), StatusCode::NOT_FOUND),
            (ScanError::AlreadyInProgress, StatusCode::CONFLICT),
            (ScanError::Upstream("Upload failed: disk".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_message_carried() {
        let err = ApiError::from(ScanError::NotFound("Scan not found".into()));
        assert_eq!(err.message, "Scan not found");
        assert_eq!(err.kind, "not_found");
    }
}
