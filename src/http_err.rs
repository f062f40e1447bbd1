use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::rate_limit::RateLimitError;

#[derive(Debug, Serialize)]
pub struct InternalServerError {
    pub message: String,
}

impl Default for InternalServerError {
    fn default() -> Self {
        Self {
            message: "Internal server error.".to_string(),
        }
    }
}

impl IntoResponse for InternalServerError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

#[derive(Serialize)]
pub struct ErrorRep {
    pub message: String,
}

impl ErrorRep {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_owned(),
        }
    }
}

#[derive(Serialize)]
struct RateLimitRep {
    message: String,
    retry_after: DateTime<Utc>,
}

pub enum ApiError {
    InternalServerError(InternalServerError),
    TooManyRequests(DateTime<Utc>),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::InternalServerError(inner) => inner.into_response(),
            Self::TooManyRequests(retry_after) => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(RateLimitRep {
                    message: "Too many attempts. Please try again later.".to_string(),
                    retry_after,
                }),
            )
                .into_response(),
        }
    }
}

impl From<InternalServerError> for ApiError {
    fn from(error: InternalServerError) -> Self {
        Self::InternalServerError(error)
    }
}

impl From<RateLimitError> for ApiError {
    fn from(error: RateLimitError) -> Self {
        match error {
            RateLimitError::LimitedUntil(time) => Self::TooManyRequests(time),
            RateLimitError::Other(error) => error.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        error!(?error, "Received error.");

        Self::InternalServerError(Default::default())
    }
}

pub type ApiResponse<T> = Result<T, ApiError>;
