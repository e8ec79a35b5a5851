use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayerError>;

/// HTTP-facing error type (spec §7). Domain invariant violations from `payment-core`
/// are wrapped via `#[from]` and remapped to a status code here — `CoreError` itself
/// never carries HTTP semantics.
#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid status transition: {0}")]
    InvalidStatus(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("already in progress: {0}")]
    AlreadyInProgress(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("domain error: {0}")]
    Core(#[from] payment_core::CoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("zkvm service error: {0}")]
    Zkvm(String),

    #[error("scanner service error: {0}")]
    Scanner(String),

    #[error("rpc/signer service error: {0}")]
    RpcSigner(String),

    /// Terminal-for-this-attempt (spec §7): user-driven retry is allowed for this one.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// Terminal-for-this-attempt (spec §7): user-driven retry is allowed for this one.
    #[error("proof generation failed: {0}")]
    ProofFailed(String),

    /// Terminal (spec §7): proof invalid or nullifier already used — cancel is the
    /// only path, no retry.
    #[error("verification failed: {0}")]
    VerifyFailed(String),

    #[error("auth token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for RelayerError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayerError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayerError::InvalidStatus(_) => StatusCode::CONFLICT,
            RelayerError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayerError::Forbidden(_) => StatusCode::FORBIDDEN,
            RelayerError::AlreadyInProgress(_) => StatusCode::CONFLICT,
            RelayerError::Conflict(_) => StatusCode::CONFLICT,
            RelayerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayerError::Core(_) => StatusCode::BAD_REQUEST,
            RelayerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayerError::Zkvm(_) => StatusCode::BAD_GATEWAY,
            RelayerError::Scanner(_) => StatusCode::BAD_GATEWAY,
            RelayerError::RpcSigner(_) => StatusCode::BAD_GATEWAY,
            RelayerError::SubmissionFailed(_) => StatusCode::CONFLICT,
            RelayerError::ProofFailed(_) => StatusCode::CONFLICT,
            RelayerError::VerifyFailed(_) => StatusCode::CONFLICT,
            RelayerError::Jwt(_) => StatusCode::UNAUTHORIZED,
            RelayerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Database and Internal errors get logged with full detail but never echo
        // internals back to the client (spec §7).
        let message = match &self {
            RelayerError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "internal error".to_string()
            }
            RelayerError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
