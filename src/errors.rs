use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// No bearer token was presented
    #[error("Missing API key")]
    MissingAuth,

    /// Bearer token did not match any key
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Key exists but has been revoked
    #[error("API key has been revoked")]
    RevokedApiKey,

    /// Per-key fixed-window limit exceeded
    #[error("Rate limit exceeded: {limit} requests per minute")]
    RateLimitExceeded { limit: u32, retry_after_secs: u64 },

    /// Malformed body, unsafe URL, bad filename, etc.
    #[error("{message}")]
    InvalidRequest { message: String },

    /// Requested resource not found (or not owned by the caller)
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    /// Result exceeds the caller's size ceiling
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// The job reached a terminal failed state (surfaced by the sync path)
    #[error("Job failed: {code}")]
    JobFailed { code: String, message: String },

    /// Store operation error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingAuth | Error::InvalidApiKey | Error::RevokedApiKey => StatusCode::UNAUTHORIZED,
            Error::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::JobFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Store(store_err) => match store_err {
                StoreError::NotFound => StatusCode::NOT_FOUND,
                StoreError::Conflict { .. } => StatusCode::CONFLICT,
                StoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
                StoreError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingAuth => "missing_auth",
            Error::InvalidApiKey => "invalid_api_key",
            Error::RevokedApiKey => "revoked_api_key",
            Error::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Error::InvalidRequest { .. } => "invalid_request",
            Error::NotFound { .. } => "not_found",
            Error::PayloadTooLarge { .. } => "payload_too_large",
            Error::JobFailed { .. } => "job_failed",
            Error::Store(StoreError::NotFound) => "not_found",
            Error::Store(StoreError::Conflict { .. }) | Error::Store(StoreError::InvalidTransition { .. }) => "conflict",
            Error::Store(StoreError::Other(_)) | Error::Other(_) => "internal_error",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::MissingAuth => "Authentication required: pass an API key as a bearer token".to_string(),
            Error::InvalidApiKey => "Invalid API key".to_string(),
            Error::RevokedApiKey => "This API key has been revoked".to_string(),
            Error::RateLimitExceeded { limit, .. } => {
                format!("Rate limit of {limit} requests per minute exceeded")
            }
            Error::InvalidRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} {id} not found"),
            Error::PayloadTooLarge { message } => message.clone(),
            Error::JobFailed { message, .. } => message.clone(),
            Error::Store(store_err) => match store_err {
                StoreError::NotFound => "Resource not found".to_string(),
                StoreError::Conflict { message } => message.clone(),
                StoreError::InvalidTransition { .. } => "Resource is in a conflicting state".to_string(),
                StoreError::Other(_) => "Internal server error".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Store(StoreError::Other(_)) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Store(_) => {
                tracing::warn!("Store constraint error: {}", self);
            }
            Error::MissingAuth | Error::InvalidApiKey | Error::RevokedApiKey => {
                tracing::info!("Authentication error: {}", self);
            }
            Error::RateLimitExceeded { .. } => {
                tracing::info!("Rate limit error: {}", self);
            }
            Error::InvalidRequest { .. } | Error::NotFound { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::JobFailed { .. } => {
                tracing::debug!("Job failure surfaced to client: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            // Rate limit responses carry a retry-after hint
            Error::RateLimitExceeded { retry_after_secs, .. } => {
                let body = json!({
                    "error": { "code": self.code(), "message": self.user_message() }
                });
                (
                    status,
                    [("retry-after", retry_after_secs.to_string())],
                    axum::response::Json(body),
                )
                    .into_response()
            }
            // Job failures surface the job's own error code, not the HTTP taxonomy code
            Error::JobFailed { code, message } => {
                let body = json!({
                    "error": { "code": code, "message": message }
                });
                (status, axum::response::Json(body)).into_response()
            }
            _ => {
                let body = json!({
                    "error": { "code": self.code(), "message": self.user_message() }
                });
                (status, axum::response::Json(body)).into_response()
            }
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
