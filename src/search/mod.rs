//! Search sessions with supersession.
//!
//! At most one search is active per [`SearchController`]. Starting a new one
//! cancels the previous session first, so a stale stream can never dispatch
//! into the newer session. A session's slot is only cleared by the session
//! that installed it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::api::{ApiClient, SearchRequest};
use crate::stream::{SearchError, SearchOutcome, SearchUpdate, StreamIngestor};

/// Results requested per search unless configured otherwise.
pub const DEFAULT_MAX_RESULTS: u32 = 20;

#[derive(Debug)]
struct ActiveSearch {
    id: u64,
    token: CancellationToken,
}

/// Owns the active search session, if any.
#[derive(Debug)]
pub struct SearchController {
    client: ApiClient,
    ingestor: StreamIngestor,
    max_results: u32,
    active: Mutex<Option<ActiveSearch>>,
    next_id: AtomicU64,
}

/// Clears the active slot on every exit path, unless superseded meanwhile.
struct SessionGuard<'a> {
    controller: &'a SearchController,
    id: u64,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.controller.lock_active();
        if active.as_ref().is_some_and(|session| session.id == self.id) {
            *active = None;
        }
    }
}

impl SearchController {
    #[must_use]
    pub fn new(client: ApiClient, ingestor: StreamIngestor, max_results: u32) -> Self {
        Self {
            client,
            ingestor,
            max_results,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveSearch>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a search for `query`, superseding any search still in flight.
    ///
    /// Results and status changes go to `updates`. An empty query is rejected
    /// before any session is touched, so it never cancels a running search.
    ///
    /// # Errors
    ///
    /// [`SearchError::EmptyQuery`] for a blank query,
    /// [`SearchError::Cancelled`] when superseded or cancelled, otherwise the
    /// session's terminal failure.
    #[instrument(skip(self, updates), fields(max_results = self.max_results))]
    pub async fn search(
        &self,
        query: &str,
        updates: &UnboundedSender<SearchUpdate>,
    ) -> Result<SearchOutcome, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            let mut active = self.lock_active();
            if let Some(previous) = active.take() {
                debug!(superseded = previous.id, "cancelling previous search");
                previous.token.cancel();
            }
            *active = Some(ActiveSearch {
                id,
                token: token.clone(),
            });
        }
        let _guard = SessionGuard { controller: self, id };
        info!(search = id, "search started");

        let request = SearchRequest {
            query: query.to_string(),
            max_results: self.max_results,
        };
        let search_id: Mutex<Option<String>> = Mutex::new(None);
        let open = async {
            let response = self
                .client
                .open_search(&request)
                .await
                .map_err(SearchError::Open)?;
            *search_id.lock().unwrap_or_else(PoisonError::into_inner) =
                response.search_id.clone();
            Ok::<_, SearchError>(response.into_chunks())
        };

        let result = self.ingestor.run(open, &token, updates).await;

        if let Err(SearchError::Cancelled | SearchError::Timeout { .. }) = &result {
            let server_id = search_id
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(server_id) = server_id {
                self.cancel_on_server(server_id);
            }
        }
        result
    }

    /// Cancels the active search, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.lock_active().take() {
            Some(session) => {
                session.token.cancel();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Best effort: the backend stops producing results nobody will read.
    fn cancel_on_server(&self, server_id: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = self.client.clone();
        runtime.spawn(async move {
            if let Err(error) = client.cancel_search(&server_id).await {
                debug!(search_id = %server_id, error = %error, "server-side search cancel failed");
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn controller() -> SearchController {
        // Nothing listens here; tests below never reach the network.
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        SearchController::new(client, StreamIngestor::new(Duration::from_secs(1)), 5)
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_without_session() {
        let controller = controller();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = controller.search("   ", &tx).await.unwrap_err();

        assert!(matches!(err, SearchError::EmptyQuery));
        assert!(!controller.is_active());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_query_does_not_cancel_running_search() {
        let controller = controller();
        let token = CancellationToken::new();
        *controller.lock_active() = Some(ActiveSearch {
            id: 99,
            token: token.clone(),
        });
        let (tx, _rx) = mpsc::unbounded_channel();

        let _ = controller.search("", &tx).await;

        assert!(!token.is_cancelled());
        assert!(controller.is_active());
    }

    #[test]
    fn test_cancel_without_session() {
        assert!(!controller().cancel());
    }

    #[test]
    fn test_cancel_active_session() {
        let controller = controller();
        let token = CancellationToken::new();
        *controller.lock_active() = Some(ActiveSearch {
            id: 1,
            token: token.clone(),
        });

        assert!(controller.cancel());
        assert!(token.is_cancelled());
        assert!(!controller.is_active());
    }

    #[test]
    fn test_guard_leaves_newer_session_in_place() {
        let controller = controller();
        *controller.lock_active() = Some(ActiveSearch {
            id: 2,
            token: CancellationToken::new(),
        });

        drop(SessionGuard {
            controller: &controller,
            id: 1,
        });
        assert!(controller.is_active());

        drop(SessionGuard {
            controller: &controller,
            id: 2,
        });
        assert!(!controller.is_active());
    }
}
