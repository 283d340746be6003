//! Request and response bodies of the Mediathek backend.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Job category; selects the `/api/download/{category}` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobCategory {
    Video,
    Audio,
}

impl JobCategory {
    /// Path segment used by the backend.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Container formats the backend accepts for this category.
    #[must_use]
    pub fn allowed_formats(self) -> &'static [&'static str] {
        match self {
            Self::Video => &["mp4", "mkv"],
            Self::Audio => &["mp3", "wav"],
        }
    }

    #[must_use]
    pub fn default_format(self) -> &'static str {
        self.allowed_formats()[0]
    }
}

impl fmt::Display for JobCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier of one outstanding server-side job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of `POST /api/download/{category}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub urls: Vec<String>,
    pub format: String,
    pub output_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_timestamped_folder: Option<bool>,
}

/// Successful answer to a job submission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadAccepted {
    pub task_id: TaskHandle,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub output_folder: Option<String>,
}

/// Failure body returned with non-success statuses.
///
/// `detail` is usually a string; request validation failures carry a list of
/// `{"loc": [...], "msg": "..."}` objects instead.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorDetail {
    pub detail: serde_json::Value,
}

impl ErrorDetail {
    /// Readable message, or `None` when the detail is empty.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        let message = match &self.detail {
            serde_json::Value::Null => return None,
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Array(items) => items
                .iter()
                .map(describe_validation_item)
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        };
        let trimmed = message.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

fn describe_validation_item(item: &serde_json::Value) -> String {
    let Some(msg) = item.get("msg").and_then(serde_json::Value::as_str) else {
        return match item {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
    };
    let location = item
        .get("loc")
        .and_then(serde_json::Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .map(|part| match part {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(".")
        })
        .filter(|location| !location.is_empty());
    match location {
        Some(location) => format!("{location}: {msg}"),
        None => msg.to_string(),
    }
}

/// Lifecycle state reported in a [`TaskStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Complete,
    Failed,
}

/// Snapshot returned by `GET /api/status/{task_id}`.
///
/// Fetched fresh on every poll tick and never mutated.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskStatus {
    #[serde(rename = "status")]
    pub raw_state: String,
    #[serde(rename = "progress", default)]
    pub overall_progress: f64,
    #[serde(rename = "message", default)]
    pub overall_message: String,
    #[serde(rename = "current_file_progress", default)]
    pub current_item_progress: Option<f64>,
    #[serde(rename = "current_file_message", default)]
    pub current_item_message: Option<String>,
    #[serde(rename = "failed_urls", default)]
    pub failed_items: Vec<String>,
    #[serde(default)]
    pub current_file: Option<u32>,
    #[serde(default)]
    pub total_files: Option<u32>,
    #[serde(default)]
    pub zip_ready: bool,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl TaskStatus {
    /// Maps the backend's free-form state string.
    ///
    /// `pending`, `queued`, `downloading` and anything unknown count as running.
    #[must_use]
    pub fn state(&self) -> TaskState {
        match self.raw_state.as_str() {
            "complete" => TaskState::Complete,
            "error" => TaskState::Failed,
            _ => TaskState::Running,
        }
    }

    /// Overall progress clamped into `0..=100`.
    #[must_use]
    pub fn overall_percent(&self) -> f64 {
        clamp_percent(self.overall_progress)
    }

    /// Current-item progress clamped into `0..=100`, when reported.
    #[must_use]
    pub fn current_item_percent(&self) -> Option<f64> {
        self.current_item_progress.map(clamp_percent)
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Body of `POST /api/search/youtube`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,
}

/// One video found by a streamed search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchResult {
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub video_id: Option<String>,
}
