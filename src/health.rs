//! Backend liveness checks.
//!
//! [`check_backend`] probes `GET /health` once; [`run_health_monitor`] repeats
//! the probe on a fixed interval and publishes the latest result on a
//! `watch` channel, logging only transitions.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};

/// Period between liveness probes (10 seconds).
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(10);

/// Budget of one probe (15 seconds).
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    /// No probe has finished yet.
    Unknown,
    Online,
    Offline { reason: String },
    TimedOut,
}

impl BackendStatus {
    #[must_use]
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("checking"),
            Self::Online => f.write_str("online"),
            Self::Offline { reason } => write!(f, "offline ({reason})"),
            Self::TimedOut => f.write_str("offline (timed out)"),
        }
    }
}

/// Probes the backend once.
pub async fn check_backend(client: &ApiClient, timeout: Duration) -> BackendStatus {
    match client.health(timeout).await {
        Ok(()) => BackendStatus::Online,
        Err(ApiError::Timeout { .. }) => BackendStatus::TimedOut,
        Err(error) => BackendStatus::Offline {
            reason: error.to_string(),
        },
    }
}

/// Probes every `every` until `token` is cancelled or nobody is watching.
///
/// The first probe runs immediately.
pub async fn run_health_monitor(
    client: ApiClient,
    every: Duration,
    timeout: Duration,
    status: watch::Sender<BackendStatus>,
    token: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let current = tokio::select! {
            biased;
            () = token.cancelled() => return,
            current = check_backend(&client, timeout) => current,
        };

        let changed = status.send_if_modified(|previous| {
            if *previous == current {
                false
            } else {
                *previous = current.clone();
                true
            }
        });
        if changed {
            if current.is_online() {
                info!(backend = %client.base_url(), "backend online");
            } else {
                warn!(backend = %client.base_url(), status = %current, "backend unavailable");
            }
        }
        if status.is_closed() {
            return;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_check_backend_online() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        assert_eq!(
            check_backend(&client, Duration::from_secs(5)).await,
            BackendStatus::Online
        );
    }

    #[tokio::test]
    async fn test_check_backend_timed_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        assert_eq!(
            check_backend(&client, Duration::from_millis(100)).await,
            BackendStatus::TimedOut
        );
    }

    #[tokio::test]
    async fn test_monitor_publishes_and_stops_on_cancel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let (tx, mut rx) = watch::channel(BackendStatus::Unknown);
        let token = CancellationToken::new();
        let monitor = tokio::spawn(run_health_monitor(
            client,
            Duration::from_secs(10),
            Duration::from_secs(5),
            tx,
            token.clone(),
        ));

        rx.changed().await.unwrap();
        assert!(matches!(*rx.borrow(), BackendStatus::Offline { .. }));

        token.cancel();
        monitor.await.unwrap();
    }

    #[test]
    fn test_status_display() {
        assert_eq!(BackendStatus::Online.to_string(), "online");
        assert_eq!(BackendStatus::TimedOut.to_string(), "offline (timed out)");
    }
}
