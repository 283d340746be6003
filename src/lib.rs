//! Mediathek Core Library
//!
//! Client-side core for a Mediathek media backend: submit batches of
//! download jobs and follow their progress, and run searches whose results
//! arrive over a live, chunked response.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`api`] - HTTP surface of the backend (health, jobs, status, search)
//! - [`stream`] - Framing and parsing of streamed search responses
//! - [`search`] - Search sessions; a new search supersedes the running one
//! - [`poll`] - Fixed-interval task status polling
//! - [`submit`] - Job validation and submission, one controller per category
//! - [`health`] - Backend liveness probes
//! - [`failure`] - Failure taxonomy shared by all error types
//!
//! Progress and search events are emitted on `tokio` channels; rendering is
//! left to the caller.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod failure;
pub mod health;
pub mod poll;
pub mod search;
pub mod stream;
pub mod submit;
mod user_agent;

// Re-export commonly used types
pub use api::{ApiClient, ApiError, JobCategory, TaskHandle, TaskStatus};
pub use failure::{FailureDescriptor, FailureKind, describe};
pub use health::{BackendStatus, check_backend, run_health_monitor};
pub use poll::{
    DEFAULT_POLL_INTERVAL, PollError, PollOutcome, PollRetryPolicy, ProgressSnapshot,
    ProgressUpdate, StatusSource, TaskPoller, TaskSummary,
};
pub use search::{DEFAULT_MAX_RESULTS, SearchController};
pub use stream::{
    DEFAULT_SEARCH_TIMEOUT, SearchError, SearchOutcome, SearchStatus, SearchUpdate, StreamEvent,
    StreamIngestor,
};
pub use submit::{
    DownloadJob, SubmitError, SubmitOptions, TaskSubmissionController, ValidationError,
};
pub use tokio_util::sync::CancellationToken;
