//! Backend HTTP surface: health, job submission, task status and streamed search.
//!
//! # Example
//!
//! ```no_run
//! use mediathek_core::api::{ApiClient, TaskHandle};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new("http://localhost:8000")?;
//! let status = client.fetch_status(&TaskHandle::new("t1")).await?;
//! println!("{:.0}% {}", status.overall_percent(), status.overall_message);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod types;

pub use client::{
    ApiClient, DEFAULT_API_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS,
    SEARCH_ID_HEADER, SearchResponse,
};
pub use error::ApiError;
pub use types::{
    DownloadAccepted, DownloadRequest, ErrorDetail, JobCategory, SearchRequest, SearchResult,
    TaskHandle, TaskState, TaskStatus,
};
