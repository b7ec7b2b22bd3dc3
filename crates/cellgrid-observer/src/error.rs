//! Error types for the HTTP surface.
//!
//! [`ObserverError`] is rendered as `{"error": ..., "status": ...}` via
//! its [`IntoResponse`] implementation.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cellgrid_core::ServiceError;

/// Errors that can occur while serving a request.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request body, path or a field in it was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for ObserverError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::InvalidInput(msg) => Self::InvalidInput(msg),
            not_found @ ServiceError::NotFound { .. } => Self::NotFound(not_found.to_string()),
            ServiceError::Store(inner) => Self::Internal(inner.to_string()),
        }
    }
}

impl From<JsonRejection> for ObserverError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use cellgrid_store::StoreError;

    use super::*;

    #[test]
    fn service_errors_map_to_status_codes() {
        let cases = [
            (
                ServiceError::InvalidInput("bad id".to_owned()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::NotFound {
                    kind: "cell",
                    id: "1x1".to_owned(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::Store(StoreError::Journal("disk full".to_owned())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            let response = ObserverError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn not_found_message_names_the_kind() {
        let error = ObserverError::from(ServiceError::NotFound {
            kind: "sensor",
            id: "s-1".to_owned(),
        });
        assert_eq!(error.to_string(), "not found: sensor not found: s-1");
    }
}
