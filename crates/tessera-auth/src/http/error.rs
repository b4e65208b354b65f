//! HTTP responses for authentication errors.
//!
//! Implements `IntoResponse` for [`AuthError`] so handlers and extractors
//! can return it directly. Bodies use the common error envelope
//! `{"error": {"code", "message"}}`.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        let message = self.to_string();

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(self.error_code(), &message);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        let body = json!({
            "error": {
                "code": self.error_code(),
                "message": message,
            }
        });

        (status, headers, Json(body)).into_response()
    }
}

fn status_code(error: &AuthError) -> StatusCode {
    match error {
        AuthError::Unauthorized { .. } | AuthError::InvalidSession => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden { .. } | AuthError::TenantIsolation { .. } => StatusCode::FORBIDDEN,
        AuthError::TenantNotFound { .. } => StatusCode::NOT_FOUND,
        AuthError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::RotationFailed { .. }
        | AuthError::Storage { .. }
        | AuthError::Configuration { .. }
        | AuthError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Format: `Session realm="tessera", error="...", error_description="..."`.
fn build_www_authenticate_header(error: &str, description: &str) -> String {
    let escaped = description.replace('"', "\\\"");
    format!(
        "Session realm=\"tessera\", error=\"{}\", error_description=\"{}\"",
        error, escaped
    )
}
