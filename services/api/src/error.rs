//! Error types for the API service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::mail::MailError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::repositories::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// No valid credentials were presented
    #[error("Unauthenticated")]
    Unauthenticated,

    /// The caller does not own the resource, or it does not exist
    #[error("Unauthorized")]
    Unauthorized,

    /// Bad request with message
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The record already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many attempts")]
    TooManyRequests,

    /// Email delivery failed
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Internal server error")]
    InternalServerError,

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            // a missing record answers the same as a foreign one
            StoreError::NotFound => ApiError::Unauthorized,
            StoreError::AlreadyExists(what) => ApiError::Conflict(what),
            other => ApiError::Store(other),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated | ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Mail(_) | ApiError::InternalServerError | ApiError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            ApiError::Unauthenticated | ApiError::Unauthorized => "Forbidden".to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Conflict(_) => "Account already exists".to_string(),
            ApiError::TooManyRequests => "Too many attempts, try again later".to_string(),
            ApiError::Mail(e) => {
                error!("Failed to send email: {}", e);
                "Failed to send email".to_string()
            }
            ApiError::Store(e) => {
                error!("Store failure: {}", e);
                "Internal server error".to_string()
            }
            ApiError::InternalServerError => "Internal server error".to_string(),
        };

        if status == StatusCode::FORBIDDEN {
            warn!("Request refused: {}", self);
        }

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
