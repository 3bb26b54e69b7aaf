//! Proxy error types.
//!
//! Backend failures are absorbed inside [`crate::backend`] and never reach
//! the HTTP layer. Whatever does reach it is rendered as a 500 with a
//! `{"detail": ...}` body.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("session expired (status {status})")]
    SessionExpired { status: u16 },

    #[error("backend returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Failed to get response after multiple attempts")]
    ExhaustedRetries,

    #[error("invalid header value for {name}")]
    InvalidHeader { name: &'static str },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ProxyError {
    /// Whether a failed attempt should wait out a backoff step before retrying.
    pub fn backs_off(&self) -> bool {
        !matches!(self, Self::SessionExpired { .. })
    }
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}
