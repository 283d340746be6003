//! Fixed-interval status polling for one outstanding task.
//!
//! A [`TaskPoller`] moves `Idle -> Polling -> Complete`, with side exits to
//! cancelled and failed. While polling it owns the task handle; the handle is
//! released on every terminal transition so the next `start` is accepted.
//!
//! Each tick fetches a fresh [`TaskStatus`] and forwards it as a
//! [`ProgressUpdate::Progress`]. A failed fetch is logged and retried on the
//! next tick. By default retries never stop; [`PollRetryPolicy`] can cap them.

mod error;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub use error::PollError;

use crate::api::{ApiClient, ApiError, TaskHandle, TaskState, TaskStatus};

/// Period between status fetches (1 second).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Anything that can report a task's status.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, handle: &TaskHandle) -> Result<TaskStatus, ApiError>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, handle: &TaskHandle) -> Result<TaskStatus, ApiError> {
        ApiClient::fetch_status(self, handle).await
    }
}

/// What to do about failed status fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollRetryPolicy {
    /// Retry on every tick forever.
    #[default]
    Unbounded,
    /// Give up after this many failed fetches in a row. `0` behaves like
    /// [`PollRetryPolicy::Unbounded`].
    MaxConsecutiveFailures(u32),
}

impl PollRetryPolicy {
    /// Builds a policy from a config value where `0` means unbounded.
    #[must_use]
    pub fn from_limit(limit: u32) -> Self {
        if limit == 0 {
            Self::Unbounded
        } else {
            Self::MaxConsecutiveFailures(limit)
        }
    }

    fn exhausted(self, failures: u32) -> bool {
        match self {
            Self::Unbounded | Self::MaxConsecutiveFailures(0) => false,
            Self::MaxConsecutiveFailures(max) => failures >= max,
        }
    }
}

/// Current-item fields; each part is present only when the snapshot had it.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemProgress {
    pub progress: Option<f64>,
    pub message: Option<String>,
}

/// Renderer view of one status snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Percent in `0..=100`.
    pub overall_progress: f64,
    pub overall_message: String,
    /// `None` when the snapshot carried no current-item fields; the renderer
    /// keeps whatever it showed before.
    pub current_item: Option<ItemProgress>,
    pub current_file: Option<u32>,
    pub total_files: Option<u32>,
}

impl From<&TaskStatus> for ProgressSnapshot {
    fn from(status: &TaskStatus) -> Self {
        let progress = status.current_item_percent();
        let message = status.current_item_message.clone();
        let current_item = (progress.is_some() || message.is_some())
            .then_some(ItemProgress { progress, message });
        Self {
            overall_progress: status.overall_percent(),
            overall_message: status.overall_message.clone(),
            current_item,
            current_file: status.current_file,
            total_files: status.total_files,
        }
    }
}

/// Terminal summary of a completed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub handle: TaskHandle,
    pub message: String,
    pub failed_items: Vec<String>,
    /// Archive location once the backend has packed the results.
    pub download_url: Option<String>,
}

impl TaskSummary {
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed_items.len()
    }
}

/// What a renderer receives from a job.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// The backend accepted the job.
    Started { handle: TaskHandle, message: String },
    Progress(ProgressSnapshot),
    /// Sent exactly once, after the last progress update of a completed task.
    /// Current-item display resets here.
    Finished(TaskSummary),
    /// The task or the session failed; sent exactly once.
    Failed { message: String },
}

/// How a poll session ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Complete(TaskSummary),
    Cancelled,
}

#[derive(Debug)]
struct PollSession {
    handle: TaskHandle,
    token: CancellationToken,
}

/// Polls one task at a time.
pub struct TaskPoller {
    source: Arc<dyn StatusSource>,
    interval: Duration,
    retry: PollRetryPolicy,
    session: Mutex<Option<PollSession>>,
}

impl std::fmt::Debug for TaskPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPoller")
            .field("interval", &self.interval)
            .field("retry", &self.retry)
            .field("active", &self.active_handle())
            .finish_non_exhaustive()
    }
}

/// Releases the session on every exit path, including a dropped future.
struct SessionGuard<'a> {
    poller: &'a TaskPoller,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.poller.lock_session().take();
    }
}

impl TaskPoller {
    #[must_use]
    pub fn new(source: Arc<dyn StatusSource>, interval: Duration, retry: PollRetryPolicy) -> Self {
        Self {
            source,
            interval,
            retry,
            session: Mutex::new(None),
        }
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<PollSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle of the task being polled, if any.
    #[must_use]
    pub fn active_handle(&self) -> Option<TaskHandle> {
        self.lock_session()
            .as_ref()
            .map(|session| session.handle.clone())
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Asks the running session to stop. Returns whether one was running.
    ///
    /// The session ends with [`PollOutcome::Cancelled`] at its next await
    /// point and releases its handle itself.
    pub fn cancel(&self) -> bool {
        match self.lock_session().as_ref() {
            Some(session) => {
                debug!(task_id = %session.handle, "poll cancel requested");
                session.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Polls `handle` until it completes, fails, or is cancelled.
    ///
    /// The first fetch happens one interval after the call. The terminal
    /// update is sent after the handle is released, so a receiver reacting
    /// to it may `start` again right away.
    ///
    /// # Errors
    ///
    /// [`PollError::AlreadyPolling`] when a session is running (the running
    /// session is left untouched), [`PollError::TaskFailed`] when the backend
    /// reports the task failed, and [`PollError::TooManyFailures`] when the
    /// retry policy gives up.
    #[instrument(skip(self, handle, updates), fields(task_id = %handle))]
    pub async fn start(
        &self,
        handle: TaskHandle,
        updates: &UnboundedSender<ProgressUpdate>,
    ) -> Result<PollOutcome, PollError> {
        let result = self.track(handle, updates).await;
        if let Some(update) = terminal_update(&result) {
            let _ = updates.send(update);
        }
        result
    }

    /// Runs a session without sending its terminal update. The session is
    /// released by the time this returns.
    pub(crate) async fn track(
        &self,
        handle: TaskHandle,
        updates: &UnboundedSender<ProgressUpdate>,
    ) -> Result<PollOutcome, PollError> {
        let token = {
            let mut session = self.lock_session();
            if let Some(active) = session.as_ref() {
                return Err(PollError::AlreadyPolling {
                    active: active.handle.clone(),
                });
            }
            let token = CancellationToken::new();
            *session = Some(PollSession {
                handle: handle.clone(),
                token: token.clone(),
            });
            token
        };
        info!(interval = ?self.interval, "polling started");

        let result = {
            let _guard = SessionGuard { poller: self };
            self.poll_loop(&handle, &token, updates).await
        };
        match &result {
            Ok(PollOutcome::Complete(summary)) => {
                info!(failed = summary.failed_count(), "task complete");
            }
            Ok(PollOutcome::Cancelled) => info!("polling cancelled"),
            Err(error) => warn!(error = %error, "polling ended with failure"),
        }
        result
    }

    async fn poll_loop(
        &self,
        handle: &TaskHandle,
        token: &CancellationToken,
        updates: &UnboundedSender<ProgressUpdate>,
    ) -> Result<PollOutcome, PollError> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => return Ok(PollOutcome::Cancelled),
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                () = token.cancelled() => return Ok(PollOutcome::Cancelled),
                fetched = self.source.fetch_status(handle) => fetched,
            };

            let status = match fetched {
                Ok(status) => status,
                Err(error) => {
                    failures = failures.saturating_add(1);
                    warn!(failures, error = %error, "status fetch failed; retrying next tick");
                    if self.retry.exhausted(failures) {
                        return Err(PollError::TooManyFailures {
                            failures,
                            last: error,
                        });
                    }
                    continue;
                }
            };
            failures = 0;

            debug!(
                state = %status.raw_state,
                progress = status.overall_percent(),
                "status snapshot"
            );
            let _ = updates.send(ProgressUpdate::Progress(ProgressSnapshot::from(&status)));

            match status.state() {
                TaskState::Running => {}
                TaskState::Complete => {
                    let summary = TaskSummary {
                        handle: handle.clone(),
                        message: status.overall_message,
                        failed_items: status.failed_items,
                        download_url: status.download_url.filter(|_| status.zip_ready),
                    };
                    return Ok(PollOutcome::Complete(summary));
                }
                TaskState::Failed => {
                    return Err(PollError::TaskFailed {
                        handle: handle.clone(),
                        message: status.overall_message,
                    });
                }
            }
        }
    }
}

/// The single update that ends a session: a summary, a failure, or nothing
/// for cancellation and a rejected start.
pub(crate) fn terminal_update(
    result: &Result<PollOutcome, PollError>,
) -> Option<ProgressUpdate> {
    match result {
        Ok(PollOutcome::Complete(summary)) => Some(ProgressUpdate::Finished(summary.clone())),
        Ok(PollOutcome::Cancelled) | Err(PollError::AlreadyPolling { .. }) => None,
        Err(error) => Some(ProgressUpdate::Failed {
            message: error.user_message(),
        }),
    }
}
