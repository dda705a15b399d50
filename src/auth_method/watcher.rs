use super::method::Inner;
use crate::error::{FetchError, MetricsErrorKind};
use crate::prelude::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Maximum number of consecutive identical fetch errors logged at WARN before
/// downgrading to DEBUG.
const MAX_CONSECUTIVE_SAME_ERROR: u32 = 3;

/// Watcher lifecycle.
///
/// `Starting` leads straight to `Fetching` so the first credential is requested
/// without waiting for a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WatcherState {
    Starting,
    Polling,
    Fetching,
    Stopped,
}

/// Tracks repeated errors to suppress log noise.
///
/// The first N consecutive occurrences of an error kind are reported at WARN,
/// later ones at DEBUG. A different kind or a success resets the count.
#[derive(Debug)]
pub(super) struct ErrorTracker {
    last_error_kind: Option<MetricsErrorKind>,
    consecutive_same_error: u32,
    max_consecutive: u32,
}

impl ErrorTracker {
    pub(super) fn new(max_consecutive: u32) -> Self {
        Self {
            last_error_kind: None,
            consecutive_same_error: 0,
            max_consecutive,
        }
    }

    /// Records an error; returns whether it should be logged at WARN.
    pub(super) fn record_error(&mut self, kind: MetricsErrorKind) -> bool {
        let should_warn = self.last_error_kind != Some(kind)
            || self.consecutive_same_error < self.max_consecutive;

        if self.last_error_kind == Some(kind) {
            self.consecutive_same_error += 1;
        } else {
            self.consecutive_same_error = 1;
            self.last_error_kind = Some(kind);
        }

        should_warn
    }

    pub(super) fn reset(&mut self) {
        self.consecutive_same_error = 0;
        self.last_error_kind = None;
    }

    pub(super) fn consecutive_count(&self) -> u32 {
        self.consecutive_same_error
    }
}

/// Background task refreshing the cached JWT-SVID.
///
/// Owns the refresh timer and the sending half of the notification channel;
/// both are dropped when [`Watcher::run`] returns, which closes the channel for
/// consumers.
pub(super) struct Watcher {
    inner: Arc<Inner>,
    audiences: Vec<String>,
    ticker: Interval,
    notify_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
    error_tracker: ErrorTracker,
}

impl Watcher {
    pub(super) fn new(
        inner: Arc<Inner>,
        notify_tx: mpsc::Sender<()>,
        cancel: CancellationToken,
    ) -> Self {
        let period = inner.refresh_interval();
        // The first fetch happens on `Starting`, so the first tick is one period out.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            audiences: inner.settings().audiences(),
            inner,
            ticker,
            notify_tx,
            cancel,
            error_tracker: ErrorTracker::new(MAX_CONSECUTIVE_SAME_ERROR),
        }
    }

    pub(super) async fn run(mut self) {
        let mut state = WatcherState::Starting;

        loop {
            state = match state {
                WatcherState::Starting => {
                    info!(
                        "Starting JWT-SVID watcher: refresh_interval_ms={}",
                        self.ticker.period().as_millis()
                    );
                    WatcherState::Fetching
                }
                WatcherState::Polling => self.poll().await,
                WatcherState::Fetching => self.fetch().await,
                WatcherState::Stopped => break,
            };
        }

        debug!("JWT-SVID watcher stopped");
    }

    async fn poll(&mut self) -> WatcherState {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!("Cancellation signal received; stopping watcher");
                WatcherState::Stopped
            }
            _ = self.ticker.tick() => WatcherState::Fetching,
        }
    }

    async fn fetch(&mut self) -> WatcherState {
        let fetcher = Arc::clone(self.inner.fetcher());
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!("Cancellation signal received; abandoning in-flight fetch");
                return WatcherState::Stopped;
            }
            r = fetcher.fetch_jwt(&self.audiences) => r,
        };

        let token = match result.and_then(non_empty) {
            Ok(token) => token,
            Err(e) => {
                self.report_fetch_error(&e);
                return WatcherState::Polling;
            }
        };

        if self.error_tracker.consecutive_count() > 0 {
            info!(
                "JWT-SVID fetch recovered after {} consecutive failures",
                self.error_tracker.consecutive_count()
            );
            self.error_tracker.reset();
        }

        if !self.inner.store().replace_if_changed(token) {
            return WatcherState::Polling;
        }
        debug!("new jwt-svid available");
        self.inner.record_update();

        // The initial credential is picked up by the first `authenticate` call;
        // only announce refreshes once the consumer reported a successful login.
        if !self.inner.gate().is_open() {
            return WatcherState::Polling;
        }
        self.notify().await
    }

    async fn notify(&mut self) -> WatcherState {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!("Cancellation signal received while a notification was pending");
                WatcherState::Stopped
            }
            r = self.notify_tx.send(()) => {
                if r.is_err() {
                    debug!("No credential update receiver left; notification dropped");
                }
                WatcherState::Polling
            }
        }
    }

    fn report_fetch_error(&mut self, e: &FetchError) {
        let kind = e.kind();
        if self.error_tracker.record_error(kind) {
            warn!("failed to fetch jwt-svid: error={}", e);
        } else {
            debug!(
                "failed to fetch jwt-svid (repeated): error={}, consecutive_failures={}",
                e,
                self.error_tracker.consecutive_count()
            );
        }
        self.inner.record_error(kind);
    }
}

fn non_empty(token: String) -> Result<String, FetchError> {
    if token.is_empty() {
        return Err(FetchError::EmptyToken);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_tracker_downgrades_after_max_consecutive() {
        let mut tracker = ErrorTracker::new(3);
        assert!(tracker.record_error(MetricsErrorKind::FetchFailed));
        assert!(tracker.record_error(MetricsErrorKind::FetchFailed));
        assert!(tracker.record_error(MetricsErrorKind::FetchFailed));
        assert!(!tracker.record_error(MetricsErrorKind::FetchFailed));
        assert_eq!(tracker.consecutive_count(), 4);
    }

    #[test]
    fn test_error_tracker_resets_on_new_kind() {
        let mut tracker = ErrorTracker::new(1);
        assert!(tracker.record_error(MetricsErrorKind::FetchFailed));
        assert!(!tracker.record_error(MetricsErrorKind::FetchFailed));
        assert!(tracker.record_error(MetricsErrorKind::EmptyToken));
        assert_eq!(tracker.consecutive_count(), 1);

        tracker.reset();
        assert_eq!(tracker.consecutive_count(), 0);
        assert!(tracker.record_error(MetricsErrorKind::EmptyToken));
    }

    #[test]
    fn test_empty_token_is_a_fetch_error() {
        assert!(matches!(non_empty(String::new()), Err(FetchError::EmptyToken)));
        assert_eq!(non_empty("t".to_owned()).unwrap(), "t");
    }
}
