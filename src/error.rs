use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::models::section::SectionName;
use crate::utils::retry::Retryable;

/// Failure raised inside a source adapter before it is folded into a
/// failed `NormalizedRecord`.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Too Many Requests (HTTP 429) from {url}")]
    RateLimited { url: String },

    /// Throttling reported inside a 200 body.
    #[error("rate limit notice: {message}")]
    Throttled { message: String },

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("no candidate produced {what}")]
    NoMatch { what: String },

    #[error("not enough {what}: needed {needed}, got {got}")]
    Insufficient {
        what: String,
        needed: usize,
        got: usize,
    },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("{name} is not configured")]
    MissingCredential { name: String },
}

impl SourceError {
    pub fn no_match(what: impl Into<String>) -> Self {
        Self::NoMatch { what: what.into() }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

impl Retryable for SourceError {
    fn is_rate_limited(&self) -> bool {
        match self {
            SourceError::RateLimited { .. } | SourceError::Throttled { .. } => true,
            SourceError::Http(e) => e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS),
            _ => false,
        }
    }
}

// ========== HTTP layer ==========

/// Failure returned by a request handler. Rendered as
/// `{"status": "error", "message": ..., "timestamp": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{section} unavailable: {message}")]
    SectionUnavailable { section: SectionName, message: String },

    #[error("report generation failed: {0}")]
    Render(String),

    #[error("server setup error: {0}")]
    Setup(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            // partial-data endpoints report a failed section in the body
            ApiError::SectionUnavailable { .. } => StatusCode::OK,
            ApiError::Render(_) | ApiError::Setup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        log::error!("{}", self);
        let body = serde_json::json!({
            "status": "error",
            "message": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}
