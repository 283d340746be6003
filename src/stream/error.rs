//! Error types for streamed search sessions.

use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;
use crate::failure::FailureKind;

/// Terminal failures of a search session.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The query was empty after trimming.
    #[error("search query is empty")]
    EmptyQuery,

    /// The request could not be opened; nothing was ingested.
    #[error("search request failed: {0}")]
    Open(#[source] ApiError),

    /// The body broke off mid-stream.
    #[error("search stream interrupted: {message}")]
    Read { message: String },

    /// The backend sent an `error` record.
    #[error("search failed: {message}")]
    ServerReported { message: String },

    /// The stream ended without `done` after at least one unreadable record.
    #[error("search stream ended without completion; last unreadable record: {message}")]
    Protocol { message: String },

    /// No terminal record arrived within the session budget.
    #[error("search timed out after {}s", .budget.as_secs())]
    Timeout { budget: Duration },

    /// Superseded by a newer search or cancelled by the caller.
    #[error("search cancelled")]
    Cancelled,
}

impl SearchError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::EmptyQuery => FailureKind::Validation,
            Self::Open(error) => error.kind(),
            Self::Read { .. } => FailureKind::Transport,
            Self::ServerReported { .. } => FailureKind::ServerReported,
            Self::Protocol { .. } => FailureKind::Protocol,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Message for the user; backend messages are passed through verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ServerReported { message } => message.clone(),
            Self::Open(error) => error.user_message(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_distinct_from_transport() {
        let timeout = SearchError::Timeout {
            budget: Duration::from_secs(30),
        };
        assert_eq!(timeout.kind(), FailureKind::Timeout);
        assert_eq!(timeout.to_string(), "search timed out after 30s");

        let read = SearchError::Read {
            message: "connection reset".to_string(),
        };
        assert_eq!(read.kind(), FailureKind::Transport);
    }

    #[test]
    fn test_server_message_is_verbatim() {
        let error = SearchError::ServerReported {
            message: "quota exceeded".to_string(),
        };
        assert_eq!(error.user_message(), "quota exceeded");
    }

    #[test]
    fn test_cancelled_is_silent() {
        assert!(!SearchError::Cancelled.kind().is_user_visible());
        assert!(SearchError::EmptyQuery.kind().is_user_visible());
    }
}
