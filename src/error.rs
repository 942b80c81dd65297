use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for almoner
#[derive(Debug, thiserror::Error)]
pub enum AlmonerError {
    /// A state-changing request carried no authenticity token, a malformed
    /// one, or one not bound to the requester's session.
    #[error("Invalid authenticity token")]
    TokenMissingOrMismatch,

    /// An inbound webhook's signature did not match the recomputed digest.
    #[error("Invalid webhook signature")]
    SignatureInvalid,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Error body returned to clients
#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
    error_id: String,
}

impl AlmonerError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TokenMissingOrMismatch | Self::SignatureInvalid | Self::Forbidden(_) => {
                StatusCode::FORBIDDEN
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) | Self::Config(_) | Self::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand to a client.
    ///
    /// Security rejections use a fixed string so the expected token or
    /// digest is never echoed. Server errors are reduced to a generic message
    /// (CWE-209); the full error goes to the server log only.
    pub fn safe_message(&self) -> String {
        match self {
            Self::TokenMissingOrMismatch | Self::SignatureInvalid | Self::PayloadTooLarge => {
                self.to_string()
            }
            Self::BadRequest(msg) => format!("Bad request: {}", msg),
            Self::Forbidden(msg) => format!("Forbidden: {}", msg),
            Self::Internal(_) | Self::Config(_) | Self::Anyhow(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for AlmonerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request failed"
            );
        } else {
            tracing::warn!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request rejected"
            );
        }

        let body = Json(ErrorResponse {
            error: self.safe_message(),
            error_id,
        });

        (status, body).into_response()
    }
}

/// Result type alias for almoner handlers
pub type Result<T> = std::result::Result<T, AlmonerError>;

impl From<serde_json::Error> for AlmonerError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            AlmonerError::BadRequest(format!("JSON error: {}", err))
        } else {
            AlmonerError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}
