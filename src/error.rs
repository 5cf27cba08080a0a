use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failures of a Billing Collaborator call.
///
/// Never escapes the reconciliation boundary; reconciliation degrades every
/// variant to "no change" plus a log line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BillingError {
    /// The session was not (yet) visible to the billing backend
    #[error("Auth session missing: {0}")]
    AuthMissing(String),

    #[error("Billing transport or server error: {0}")]
    TransportOrServer(String),

    #[error("Malformed billing response: {0}")]
    MalformedResponse(String),
}

impl BillingError {
    /// Only a transiently missing auth session is worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BillingError::AuthMissing(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    ExpiredToken,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Billing(ref e) => {
                tracing::error!("Billing error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "BILLING_UNAVAILABLE",
                    "Billing service temporarily unavailable".to_string(),
                )
            }
            ApiError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unauthorized(ref msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            ApiError::InvalidToken(ref msg) => {
                tracing::warn!("Rejected access token: {}", msg);
                (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_TOKEN",
                    "Access token is invalid".to_string(),
                )
            }
            ApiError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
                "Access token has expired".to_string(),
            ),
            ApiError::Conflict(ref msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
