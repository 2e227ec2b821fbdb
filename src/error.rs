//! Gateway error taxonomy and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures a request can surface. Vendor diagnostics are logged in full;
/// response bodies carry the structured message only.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The automation bridge (or the company connection behind it) is
    /// unreachable.
    #[error("ERP connection failure: {0}")]
    Connection(String),

    /// The document store rejected a query or is unreachable.
    #[error("document store failure: {0}")]
    Store(String),

    /// The inbound payload is missing or carries an unusable field.
    #[error("invalid payload: {0}")]
    Validation(String),

    /// The vendor reported a non-zero status for a document add. Terminal
    /// for that document; no dependent step may run.
    #[error("document rejected by ERP ({code}): {description}")]
    DocumentRejected { code: i64, description: String },

    /// A correlation-key lookup returned no rows after the ERP reported
    /// success.
    #[error("data consistency failure: {0}")]
    DataConsistency(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        GatewayError::Store(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Connection(_) | GatewayError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::DocumentRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::DataConsistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(%self, "request failed");
        let body = Json(ErrorResponse {
            status: "error".into(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}
