//! Cancellable, time-bounded read loop over a chunked search response.
//!
//! The ingestor opens the response, decodes and frames every chunk, parses
//! each line and dispatches events in stream order. Exactly one terminal
//! outcome ends a session: `done`, an `error` record, timeout, cancellation,
//! a read failure, or stream exhaustion. After it nothing else is dispatched,
//! even when the current chunk still holds buffered records.

use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::SearchError;
use super::framer::{LineFramer, Utf8ChunkDecoder};
use super::record::{ParsedRecord, StreamEvent, parse_record};

/// Wall-clock budget of one search session (30 seconds).
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// What a renderer receives from a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchUpdate {
    /// A parsed event, in stream order. `Done` and `Error` arrive at most once
    /// and always last.
    Event(StreamEvent),
    Status(SearchStatus),
}

/// Session status changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    /// Still reading; `found` results so far.
    Searching { found: usize },
    /// Ended cleanly with `found` results.
    Finished { found: usize },
    /// Ended with a user-visible failure. Never sent for cancellation.
    Failed { message: String },
}

/// How a successful session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The backend sent `done`.
    Done,
    /// The body ended without `done` and without unreadable records.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    pub found: usize,
    pub end: StreamEnd,
}

/// Drives one search session at a time; reusable across sessions.
#[derive(Debug, Clone)]
pub struct StreamIngestor {
    timeout: Duration,
}

impl Default for StreamIngestor {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_TIMEOUT)
    }
}

/// Per-session decode and bookkeeping state.
struct Session<'a> {
    token: &'a CancellationToken,
    deadline: Instant,
    updates: &'a UnboundedSender<SearchUpdate>,
    decoder: Utf8ChunkDecoder,
    framer: LineFramer,
    found: usize,
    last_malformed: Option<String>,
}

impl StreamIngestor {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs one session.
    ///
    /// `open` issues the request and yields the body as a chunk stream; it
    /// counts against the timeout budget like the body reads do. `token`
    /// aborts the session at any await point; a cancelled session ends with
    /// [`SearchError::Cancelled`] and reports nothing on `updates`.
    ///
    /// # Errors
    ///
    /// Returns the terminal failure; user-visible failures are also sent as
    /// [`SearchStatus::Failed`] exactly once.
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    pub async fn run<F, S, B, E>(
        &self,
        open: F,
        token: &CancellationToken,
        updates: &UnboundedSender<SearchUpdate>,
    ) -> Result<SearchOutcome, SearchError>
    where
        F: Future<Output = Result<S, SearchError>>,
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let mut session = Session {
            token,
            deadline: Instant::now() + self.timeout,
            updates,
            decoder: Utf8ChunkDecoder::new(),
            framer: LineFramer::new(),
            found: 0,
            last_malformed: None,
        };

        let result = self.drive(open, &mut session).await;
        match &result {
            Ok(outcome) => {
                info!(found = outcome.found, end = ?outcome.end, "search finished");
                session.send(SearchUpdate::Status(SearchStatus::Finished {
                    found: outcome.found,
                }));
            }
            Err(SearchError::Cancelled) => debug!("search cancelled"),
            Err(error) => {
                warn!(error = %error, kind = ?error.kind(), "search failed");
                if error.kind().is_user_visible() {
                    session.send(SearchUpdate::Status(SearchStatus::Failed {
                        message: error.user_message(),
                    }));
                }
            }
        }
        result
    }

    async fn drive<F, S, B, E>(
        &self,
        open: F,
        session: &mut Session<'_>,
    ) -> Result<SearchOutcome, SearchError>
    where
        F: Future<Output = Result<S, SearchError>>,
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let body = tokio::select! {
            biased;
            () = session.token.cancelled() => return Err(SearchError::Cancelled),
            () = sleep_until(session.deadline) => return Err(self.timed_out()),
            opened = open => opened?,
        };
        let mut body = pin!(body);

        loop {
            let next = tokio::select! {
                biased;
                () = session.token.cancelled() => return Err(SearchError::Cancelled),
                () = sleep_until(session.deadline) => return Err(self.timed_out()),
                chunk = body.next() => chunk,
            };

            match next {
                Some(Ok(chunk)) => {
                    let text = session.decoder.decode(chunk.as_ref());
                    for line in session.framer.push(&text) {
                        if let Some(end) = self.handle_line(&line, session)? {
                            return Ok(end);
                        }
                    }
                }
                Some(Err(error)) => {
                    return Err(SearchError::Read {
                        message: error.to_string(),
                    });
                }
                None => break,
            }
        }

        let tail = session.decoder.finish();
        let mut lines = session.framer.push(&tail);
        lines.extend(session.framer.flush());
        for line in lines {
            if let Some(end) = self.handle_line(&line, session)? {
                return Ok(end);
            }
        }

        match session.last_malformed.take() {
            Some(message) => Err(SearchError::Protocol { message }),
            None => Ok(SearchOutcome {
                found: session.found,
                end: StreamEnd::Exhausted,
            }),
        }
    }

    /// Parses and dispatches one line. `Ok(Some(_))` ends the session.
    fn handle_line(
        &self,
        line: &str,
        session: &mut Session<'_>,
    ) -> Result<Option<SearchOutcome>, SearchError> {
        let event = match parse_record(line) {
            ParsedRecord::Event(event) => event,
            ParsedRecord::Ignorable => return Ok(None),
            ParsedRecord::Malformed { reason } => {
                warn!(line = %line, reason = %reason, "skipping unreadable search record");
                session.last_malformed = Some(reason);
                return Ok(None);
            }
        };

        // Terminal state may have been reached while this chunk was buffered.
        if session.token.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        if Instant::now() >= session.deadline {
            return Err(self.timed_out());
        }

        match event {
            StreamEvent::Result(result) => {
                debug!(title = %result.title, "search result");
                session.found += 1;
                session.send(SearchUpdate::Event(StreamEvent::Result(result)));
                let found = session.found;
                session.send(SearchUpdate::Status(SearchStatus::Searching { found }));
                Ok(None)
            }
            StreamEvent::Done => {
                session.send(SearchUpdate::Event(StreamEvent::Done));
                Ok(Some(SearchOutcome {
                    found: session.found,
                    end: StreamEnd::Done,
                }))
            }
            StreamEvent::Error { message } => {
                session.send(SearchUpdate::Event(StreamEvent::Error {
                    message: message.clone(),
                }));
                Err(SearchError::ServerReported { message })
            }
        }
    }

    fn timed_out(&self) -> SearchError {
        SearchError::Timeout {
            budget: self.timeout,
        }
    }
}

impl Session<'_> {
    fn send(&self, update: SearchUpdate) {
        // A dropped receiver only means nobody renders this session any more.
        let _ = self.updates.send(update);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::SearchResult;
    use futures_util::stream;
    use tokio::sync::mpsc;

    type Chunk = Result<Vec<u8>, std::io::Error>;

    fn record(title: &str) -> String {
        format!(
            "data: {{\"title\": \"{title}\", \"url\": \"https://www.youtube.com/watch?v={title}\", \"thumbnail\": \"\", \"duration\": \"1:00\"}}\n\n"
        )
    }

    fn chunked(body: &str, sizes: &[usize]) -> Vec<Chunk> {
        let bytes = body.as_bytes();
        let mut chunks = Vec::new();
        let mut start = 0;
        for size in sizes.iter().copied().cycle() {
            if start >= bytes.len() {
                break;
            }
            let end = (start + size.max(1)).min(bytes.len());
            chunks.push(Ok(bytes[start..end].to_vec()));
            start = end;
        }
        chunks
    }

    async fn opened(chunks: Vec<Chunk>) -> Result<impl Stream<Item = Chunk>, SearchError> {
        Ok(stream::iter(chunks))
    }

    /// A body fed by the test through a channel; pending until fed or closed.
    fn live_body(rx: mpsc::UnboundedReceiver<Chunk>) -> impl Stream<Item = Chunk> {
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|chunk| (chunk, rx)) })
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SearchUpdate>) -> Vec<SearchUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    fn events(updates: &[SearchUpdate]) -> Vec<StreamEvent> {
        updates
            .iter()
            .filter_map(|update| match update {
                SearchUpdate::Event(event) => Some(event.clone()),
                SearchUpdate::Status(_) => None,
            })
            .collect()
    }

    fn titles(events: &[StreamEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Result(SearchResult { title, .. }) => Some(title.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_results_then_done_for_any_chunking() {
        let body = format!("{}{}data: {{\"done\": true}}\n\n", record("A"), record("B"));

        for sizes in [vec![1], vec![2, 7], vec![5, 1, 13], vec![64], vec![body.len()]] {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let token = CancellationToken::new();
            let outcome = StreamIngestor::default()
                .run(opened(chunked(&body, &sizes)), &token, &tx)
                .await
                .unwrap();

            assert_eq!(
                outcome,
                SearchOutcome {
                    found: 2,
                    end: StreamEnd::Done
                }
            );
            let updates = drain(&mut rx);
            let events = events(&updates);
            assert_eq!(events.len(), 3, "chunk sizes {sizes:?}");
            assert_eq!(titles(&events), vec!["A", "B"]);
            assert_eq!(events[2], StreamEvent::Done);
            assert_eq!(
                updates.last(),
                Some(&SearchUpdate::Status(SearchStatus::Finished { found: 2 }))
            );
        }
    }

    #[tokio::test]
    async fn test_nothing_dispatched_after_done() {
        let body = format!("{}data: {{\"done\": true}}\n{}", record("A"), record("late"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let outcome = StreamIngestor::default()
            .run(opened(chunked(&body, &[body.len()])), &token, &tx)
            .await
            .unwrap();

        assert_eq!(outcome.found, 1);
        let events = events(&drain(&mut rx));
        assert_eq!(titles(&events), vec!["A"]);
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_error_record_is_terminal() {
        let body = format!(
            "data: {{\"error\": \"quota exceeded\"}}\n\n{}data: {{\"done\": true}}\n",
            record("A")
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let err = StreamIngestor::default()
            .run(opened(chunked(&body, &[body.len()])), &token, &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::ServerReported { ref message } if message == "quota exceeded"));
        let updates = drain(&mut rx);
        assert_eq!(
            updates,
            vec![
                SearchUpdate::Event(StreamEvent::Error {
                    message: "quota exceeded".to_string()
                }),
                SearchUpdate::Status(SearchStatus::Failed {
                    message: "quota exceeded".to_string()
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped() {
        let body = format!("data: {{broken\n{}data: {{\"done\": true}}\n", record("A"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let outcome = StreamIngestor::default()
            .run(opened(chunked(&body, &[3])), &token, &tx)
            .await
            .unwrap();

        assert_eq!(outcome.found, 1);
        assert_eq!(outcome.end, StreamEnd::Done);
        assert_eq!(titles(&events(&drain(&mut rx))), vec!["A"]);
    }

    #[tokio::test]
    async fn test_exhaustion_without_done_is_clean() {
        let body = record("A");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let outcome = StreamIngestor::default()
            .run(opened(chunked(&body, &[4])), &token, &tx)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SearchOutcome {
                found: 1,
                end: StreamEnd::Exhausted
            }
        );
        assert_eq!(
            drain(&mut rx).last(),
            Some(&SearchUpdate::Status(SearchStatus::Finished { found: 1 }))
        );
    }

    #[tokio::test]
    async fn test_exhaustion_after_malformed_record_surfaces_it() {
        let body = format!("{}data: not json\n", record("A"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let err = StreamIngestor::default()
            .run(opened(chunked(&body, &[body.len()])), &token, &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::Protocol { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_unterminated_final_record_is_flushed() {
        let body = format!("{}data: {{\"done\": true}}", record("A"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let outcome = StreamIngestor::default()
            .run(opened(chunked(&body, &[6])), &token, &tx)
            .await
            .unwrap();

        assert_eq!(outcome.end, StreamEnd::Done);
    }

    #[tokio::test]
    async fn test_open_failure_ingests_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let open = async {
            Err::<stream::Iter<std::vec::IntoIter<Chunk>>, _>(SearchError::Read {
                message: "connection refused".to_string(),
            })
        };

        let err = StreamIngestor::default()
            .run(open, &token, &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::Read { .. }));
        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 1);
        assert!(matches!(
            updates[0],
            SearchUpdate::Status(SearchStatus::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_failure_mid_stream_is_transport_error() {
        let chunks: Vec<Chunk> = vec![
            Ok(record("A").into_bytes()),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )),
        ];
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let err = StreamIngestor::default()
            .run(opened(chunks), &token, &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::Read { ref message } if message.contains("reset")));
        assert_eq!(titles(&events(&drain(&mut rx))), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_reported_once_and_late_data_is_dropped() {
        let (body_tx, body_rx) = mpsc::unbounded_channel::<Chunk>();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        body_tx.send(Ok(record("A").into_bytes())).unwrap();

        let ingestor = StreamIngestor::new(Duration::from_secs(30));
        let err = ingestor
            .run(async { Ok(live_body(body_rx)) }, &token, &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::Timeout { budget } if budget == Duration::from_secs(30)));

        // Data arriving after the timeout has nowhere to go.
        let _ = body_tx.send(Ok(b"data: {\"done\": true}\n".to_vec()));

        let updates = drain(&mut rx);
        let failures: Vec<_> = updates
            .iter()
            .filter(|u| matches!(u, SearchUpdate::Status(SearchStatus::Failed { .. })))
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0],
            &SearchUpdate::Status(SearchStatus::Failed {
                message: "search timed out after 30s".to_string()
            })
        );
        assert!(!events(&updates).contains(&StreamEvent::Done));
        assert_eq!(titles(&events(&updates)), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_covers_opening_the_request() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let open = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            opened(Vec::new()).await
        };

        let err = StreamIngestor::new(Duration::from_secs(5))
            .run(open, &token, &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_pending_read_silently() {
        let (body_tx, body_rx) = mpsc::unbounded_channel::<Chunk>();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        body_tx.send(Ok(record("A").into_bytes())).unwrap();

        let canceller = token.clone();
        let ingestor = StreamIngestor::default();
        let run = ingestor.run(async { Ok(live_body(body_rx)) }, &token, &tx);
        let cancel = async {
            tokio::task::yield_now().await;
            canceller.cancel();
        };
        let (result, ()) = tokio::join!(run, cancel);

        assert!(matches!(result, Err(SearchError::Cancelled)));
        let _ = body_tx.send(Ok(record("B").into_bytes()));

        let updates = drain(&mut rx);
        assert_eq!(titles(&events(&updates)), vec!["A"]);
        assert!(
            !updates
                .iter()
                .any(|u| matches!(u, SearchUpdate::Status(SearchStatus::Failed { .. }))),
            "cancellation must not be reported as a failure"
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start_dispatches_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        token.cancel();
        let body = format!("{}data: {{\"done\": true}}\n", record("A"));

        let result = StreamIngestor::default()
            .run(opened(chunked(&body, &[body.len()])), &token, &tx)
            .await;

        assert!(matches!(result, Err(SearchError::Cancelled)));
        assert!(drain(&mut rx).is_empty());
    }
}
