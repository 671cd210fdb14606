//! Failures of the relay itself.
//!
//! Backend 4xx/5xx answers are not errors here: they are relayed as-is.

use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("cannot build target url {url:?}: {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("target url {url:?} leaves the backend base path")]
    OutsideBasePath { url: String },

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("backend did not respond in time: {0}")]
    UpstreamTimeout(#[source] reqwest::Error),

    #[error("backend request failed: {0}")]
    Upstream(#[source] reqwest::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTarget { .. }
            | ProxyError::OutsideBasePath { .. }
            | ProxyError::BodyRead(_) => StatusCode::BAD_REQUEST,
            ProxyError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            ProxyError::InvalidTarget { .. } | ProxyError::OutsideBasePath { .. } => {
                "invalid target path"
            }
            ProxyError::BodyRead(_) => "failed to read request body",
            ProxyError::BodyTooLarge { .. } => "request body too large",
            ProxyError::UpstreamTimeout(_) => "upstream timeout",
            ProxyError::Upstream(_) => "upstream connection error",
        }
    }
}

impl ProxyError {
    /// Classify a failure to buffer the inbound body.
    pub fn from_body_rejection(rejection: BytesRejection, limit: usize) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ProxyError::BodyTooLarge { limit }
        } else {
            ProxyError::BodyRead(rejection.body_text())
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::UpstreamTimeout(e)
        } else {
            ProxyError::Upstream(e)
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Relay failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Rejected inbound request");
        }
        (
            status,
            axum::Json(serde_json::json!({ "error": self.public_message() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        let err = ProxyError::InvalidTarget {
            url: "http://[".to_string(),
            source: url::Url::parse("http://[").unwrap_err(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let escaped = ProxyError::OutsideBasePath {
            url: "http://backend/admin".to_string(),
        };
        assert_eq!(escaped.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::BodyTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_error_body_is_json() {
        let response = ProxyError::BodyTooLarge { limit: 4 }.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
    }
}
