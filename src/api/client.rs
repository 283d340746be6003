//! HTTP client wrapper for the Mediathek backend.
//!
//! [`ApiClient`] is created once and shared (it is cheap to clone), so every
//! controller reuses the same connection pool.

use std::time::Duration;

use futures_util::{Stream, TryStreamExt};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::error::ApiError;
use super::types::{
    DownloadAccepted, DownloadRequest, ErrorDetail, JobCategory, SearchRequest, TaskHandle,
    TaskStatus,
};
use crate::user_agent;

/// Backend URL used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default HTTP connect timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-read timeout (5 minutes; search bodies stay open between records).
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Response header carrying the server-side id of a streamed search.
pub const SEARCH_ID_HEADER: &str = "x-search-id";

/// Client for the backend's health, download, status and search endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
}

/// An opened, still unread search response.
#[derive(Debug)]
pub struct SearchResponse {
    /// Server-side id used by `POST /api/search/cancel/{id}`.
    pub search_id: Option<String>,
    response: Response,
}

impl SearchResponse {
    /// Consumes the response into its chunked body.
    pub fn into_chunks(self) -> impl Stream<Item = Result<Vec<u8>, reqwest::Error>> {
        self.response.bytes_stream().map_ok(|bytes| bytes.to_vec())
    }
}

impl ApiClient {
    /// Creates a client for `base_url` with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] for an unparsable base URL and
    /// [`ApiError::ClientBuild`] when reqwest rejects the configuration.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeouts(
            base_url,
            DEFAULT_CONNECT_TIMEOUT_SECS,
            DEFAULT_READ_TIMEOUT_SECS,
        )
    }

    /// Creates a client with explicit connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::new`].
    pub fn with_timeouts(
        base_url: &str,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, ApiError> {
        let base = normalize_base(base_url)?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_client_user_agent())
            .build()
            .map_err(|source| ApiError::ClientBuild { source })?;
        Ok(Self { client, base })
    }

    /// Base URL every endpoint is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|_| ApiError::invalid_url(format!("{}{path}", self.base)))
    }

    /// `GET /health`; success status means the backend is reachable.
    ///
    /// # Errors
    ///
    /// Transport errors, per-request timeout, or non-success status.
    #[instrument(level = "debug", skip(self))]
    pub async fn health(&self, timeout: Duration) -> Result<(), ApiError> {
        let url = self.endpoint("health")?;
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ApiError::from_send(url.as_str(), e))?;
        ensure_success(url.as_str(), response).await?;
        Ok(())
    }

    /// `POST /api/download/{category}`; returns the new task's handle.
    ///
    /// # Errors
    ///
    /// Non-success statuses carry the server's `detail` message when present.
    #[instrument(skip(self, request), fields(category = %category, urls = request.urls.len()))]
    pub async fn submit_job(
        &self,
        category: JobCategory,
        request: &DownloadRequest,
    ) -> Result<DownloadAccepted, ApiError> {
        let url = self.endpoint(&format!("api/download/{}", category.as_str()))?;
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::from_send(url.as_str(), e))?;
        let response = ensure_success(url.as_str(), response).await?;
        let accepted: DownloadAccepted = read_json(url.as_str(), response).await?;
        debug!(task_id = %accepted.task_id, "job accepted");
        Ok(accepted)
    }

    /// `GET /api/status/{task_id}`.
    ///
    /// # Errors
    ///
    /// Transport errors, non-success status, or an unreadable snapshot.
    #[instrument(level = "debug", skip(self), fields(task_id = %handle))]
    pub async fn fetch_status(&self, handle: &TaskHandle) -> Result<TaskStatus, ApiError> {
        let url = self.endpoint(&format!(
            "api/status/{}",
            urlencoding::encode(handle.as_str())
        ))?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ApiError::from_send(url.as_str(), e))?;
        let response = ensure_success(url.as_str(), response).await?;
        read_json(url.as_str(), response).await
    }

    /// `POST /api/search/youtube`; returns once the response head has arrived.
    ///
    /// # Errors
    ///
    /// Fails before any body is read when the request fails or the status is
    /// not a success.
    #[instrument(skip(self, request), fields(query = %request.query))]
    pub async fn open_search(&self, request: &SearchRequest) -> Result<SearchResponse, ApiError> {
        let url = self.endpoint("api/search/youtube")?;
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::from_send(url.as_str(), e))?;
        let response = ensure_success(url.as_str(), response).await?;
        let search_id = response
            .headers()
            .get(SEARCH_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        debug!(search_id = ?search_id, "search stream opened");
        Ok(SearchResponse {
            search_id,
            response,
        })
    }

    /// `POST /api/search/cancel/{search_id}`; asks the backend to stop a search.
    ///
    /// # Errors
    ///
    /// Transport errors or non-success status.
    #[instrument(level = "debug", skip(self))]
    pub async fn cancel_search(&self, search_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&format!(
            "api/search/cancel/{}",
            urlencoding::encode(search_id)
        ))?;
        let response = self
            .client
            .post(url.clone())
            .send()
            .await
            .map_err(|e| ApiError::from_send(url.as_str(), e))?;
        ensure_success(url.as_str(), response).await?;
        Ok(())
    }
}

/// Parses `base_url` and makes sure it ends with `/` so joins append.
fn normalize_base(base_url: &str) -> Result<Url, ApiError> {
    let trimmed = base_url.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|_| ApiError::invalid_url(base_url))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ApiError::invalid_url(base_url));
    }
    Ok(url)
}

/// Turns non-success responses into [`ApiError::HttpStatus`], keeping the
/// server's `detail` message when the body has one.
async fn ensure_success(url: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response
        .json::<ErrorDetail>()
        .await
        .ok()
        .and_then(|body| body.message());
    Err(ApiError::http_status(url, status.as_u16(), detail))
}

async fn read_json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, ApiError> {
    response.json::<T>().await.map_err(|e| {
        if e.is_decode() {
            ApiError::decode(url, e)
        } else {
            ApiError::from_send(url, e)
        }
    })
}
