//! Error types for backend HTTP calls.

use thiserror::Error;

use crate::failure::FailureKind;

/// Errors that can occur while talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },

    /// The configured base URL (or a path joined onto it) is not a valid URL.
    #[error("invalid backend URL: {url}")]
    InvalidUrl { url: String },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error calling {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded its per-request timeout.
    #[error("timeout calling {url}")]
    Timeout { url: String },

    /// Non-success status. `detail` holds the server's own message when the
    /// body was a `{"detail": ...}` object.
    #[error("HTTP {status} calling {url}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    HttpStatus {
        url: String,
        status: u16,
        detail: Option<String>,
    },

    /// The response body did not match the expected JSON shape.
    #[error("unexpected response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Maps a send failure, promoting reqwest timeouts to [`ApiError::Timeout`].
    pub fn from_send(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::network(url, source)
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16, detail: Option<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            detail,
        }
    }

    pub fn decode(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Position of this error in the client's failure taxonomy.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::HttpStatus {
                detail: Some(_), ..
            } => FailureKind::ServerReported,
            Self::Decode { .. } => FailureKind::Protocol,
            Self::InvalidUrl { .. } => FailureKind::Validation,
            Self::ClientBuild { .. }
            | Self::Network { .. }
            | Self::Timeout { .. }
            | Self::HttpStatus { detail: None, .. } => FailureKind::Transport,
        }
    }

    /// Message for the user. Server-provided details are returned verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::HttpStatus {
                detail: Some(detail),
                ..
            } => detail.clone(),
            other => other.to_string(),
        }
    }
}
