//! Job submission, one controller per job category.
//!
//! A [`TaskSubmissionController`] validates a job, submits it once, and polls
//! the returned task to completion. Its trigger is disabled from the moment a
//! submission is accepted for sending until the poll session ends, whatever
//! the outcome. Validation failures never touch the trigger.

mod validation;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub use validation::{
    ACCEPTED_URL_PREFIXES, ValidationError, normalize_urls, resolve_format, resolve_output_path,
};

use crate::api::{ApiClient, ApiError, DownloadRequest, JobCategory};
use crate::failure::FailureKind;
use crate::poll::{PollError, PollOutcome, PollRetryPolicy, ProgressUpdate, TaskPoller};

/// Destination folder used when a job names none.
pub const DEFAULT_OUTPUT_PATH: &str = "Downloads";

/// One job as entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadJob {
    pub urls: Vec<String>,
    /// Category default when `None`.
    pub format: Option<String>,
    /// Controller default when `None` or blank.
    pub output_path: Option<String>,
}

/// Per-controller settings.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub output_path: String,
    pub use_timestamped_folder: Option<bool>,
    pub poll_interval: Duration,
    pub retry: PollRetryPolicy,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            output_path: DEFAULT_OUTPUT_PATH.to_string(),
            use_timestamped_folder: None,
            poll_interval: crate::poll::DEFAULT_POLL_INTERVAL,
            retry: PollRetryPolicy::Unbounded,
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The trigger is disabled while a job of this category is running.
    #[error("a {category} job is already running")]
    Busy { category: JobCategory },

    #[error("submitting the job failed: {0}")]
    Submit(#[source] ApiError),

    #[error(transparent)]
    Poll(#[from] PollError),
}

impl SubmitError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) | Self::Busy { .. } => FailureKind::Validation,
            Self::Submit(error) => error.kind(),
            Self::Poll(error) => error.kind(),
        }
    }

    /// Message for the user; backend messages are passed through verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Submit(error) => error.user_message(),
            Self::Poll(error) => error.user_message(),
            other => other.to_string(),
        }
    }
}

/// Ends a submission however it ends: drops its cancel token, then
/// re-enables the trigger.
struct SubmissionGuard<'a> {
    controller: &'a TaskSubmissionController,
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        self.controller.lock_running().take();
        self.controller.trigger.store(true, Ordering::Release);
    }
}

/// Submits and tracks jobs of one category.
#[derive(Debug)]
pub struct TaskSubmissionController {
    category: JobCategory,
    client: ApiClient,
    poller: TaskPoller,
    options: SubmitOptions,
    trigger: AtomicBool,
    running: Mutex<Option<CancellationToken>>,
}

impl TaskSubmissionController {
    #[must_use]
    pub fn new(category: JobCategory, client: ApiClient, options: SubmitOptions) -> Self {
        let poller = TaskPoller::new(
            Arc::new(client.clone()),
            options.poll_interval,
            options.retry,
        );
        Self {
            category,
            client,
            poller,
            options,
            trigger: AtomicBool::new(true),
            running: Mutex::new(None),
        }
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn category(&self) -> JobCategory {
        self.category
    }

    /// Whether a new job may be submitted right now.
    #[must_use]
    pub fn trigger_enabled(&self) -> bool {
        self.trigger.load(Ordering::Acquire)
    }

    /// Stops the running submission, if any. Returns whether one was running.
    ///
    /// Works at any stage: while the job is being submitted the request is
    /// abandoned, while it is polled the poll session stops. A job the
    /// backend already accepted keeps running there.
    pub fn cancel(&self) -> bool {
        match self.lock_running().as_ref() {
            Some(token) => {
                debug!(category = %self.category, "submission cancel requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Validates, submits and polls `job` to a terminal state.
    ///
    /// Sends [`ProgressUpdate::Started`] once the backend accepts the job,
    /// then the poller's updates. The terminal update is sent after the
    /// trigger is re-enabled. A cancelled submission ends with
    /// [`PollOutcome::Cancelled`] and sends no terminal update.
    ///
    /// # Errors
    ///
    /// Validation problems, [`SubmitError::Busy`] while a job is running, the
    /// submission's own failure (with the server's message), or the poll
    /// session's failure.
    #[instrument(skip_all, fields(category = %self.category))]
    pub async fn submit(
        &self,
        job: DownloadJob,
        updates: &UnboundedSender<ProgressUpdate>,
    ) -> Result<PollOutcome, SubmitError> {
        let request = self.build_request(job)?;

        if self
            .trigger
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SubmitError::Busy {
                category: self.category,
            });
        }
        let token = CancellationToken::new();
        *self.lock_running() = Some(token.clone());

        let result = {
            let _guard = SubmissionGuard { controller: self };
            self.run(&request, &token, updates).await
        };

        let terminal = match &result {
            Ok(PollOutcome::Complete(summary)) => Some(ProgressUpdate::Finished(summary.clone())),
            Ok(PollOutcome::Cancelled) => None,
            Err(error) => Some(ProgressUpdate::Failed {
                message: error.user_message(),
            }),
        };
        if let Some(update) = terminal {
            let _ = updates.send(update);
        }
        result
    }

    async fn run(
        &self,
        request: &DownloadRequest,
        token: &CancellationToken,
        updates: &UnboundedSender<ProgressUpdate>,
    ) -> Result<PollOutcome, SubmitError> {
        let submitted = tokio::select! {
            biased;
            () = token.cancelled() => {
                info!("submission cancelled before the backend answered");
                return Ok(PollOutcome::Cancelled);
            }
            submitted = self.client.submit_job(self.category, request) => submitted,
        };
        let accepted = submitted.map_err(|error| {
            warn!(error = %error, "job submission failed");
            SubmitError::Submit(error)
        })?;
        info!(
            task_id = %accepted.task_id,
            urls = request.urls.len(),
            output_folder = accepted.output_folder.as_deref().unwrap_or(&request.output_path),
            "job accepted"
        );
        let _ = updates.send(ProgressUpdate::Started {
            handle: accepted.task_id.clone(),
            message: accepted.message,
        });

        // Dropping the poll future releases its session.
        tokio::select! {
            biased;
            () = token.cancelled() => Ok(PollOutcome::Cancelled),
            polled = self.poller.track(accepted.task_id, updates) => Ok(polled?),
        }
    }

    fn build_request(&self, job: DownloadJob) -> Result<DownloadRequest, ValidationError> {
        let urls = normalize_urls(&job.urls)?;
        let format = resolve_format(self.category, job.format.as_deref())?;
        let output_path = resolve_output_path(job.output_path.as_deref(), &self.options.output_path);
        Ok(DownloadRequest {
            urls,
            format,
            output_path,
            use_timestamped_folder: self.options.use_timestamped_folder,
        })
    }
}
