use thiserror::Error;

use crate::api::{ApiError, TaskHandle};
use crate::failure::FailureKind;

/// Ways a poll session can fail.
#[derive(Debug, Error)]
pub enum PollError {
    /// `start` was called while a session is already running.
    #[error("already polling task {active}")]
    AlreadyPolling { active: TaskHandle },

    /// The backend reported the task as failed.
    #[error("task {handle} failed: {message}")]
    TaskFailed { handle: TaskHandle, message: String },

    /// Status fetches kept failing past the configured limit.
    #[error("gave up polling after {failures} consecutive failures: {last}")]
    TooManyFailures {
        failures: u32,
        #[source]
        last: ApiError,
    },
}

impl PollError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AlreadyPolling { .. } => FailureKind::Validation,
            Self::TaskFailed { .. } => FailureKind::ServerReported,
            Self::TooManyFailures { .. } => FailureKind::Transport,
        }
    }

    /// Message for the user; backend messages are passed through verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::TaskFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
