use crate::error::MetricsErrorKind;

/// Trait for recording metrics from [`SpiffeAuthMethod`](crate::SpiffeAuthMethod).
///
/// Implement this trait to integrate with your metrics system (e.g., Prometheus, `StatsD`).
/// Prefer stable, low-cardinality labels when recording metrics.
///
/// # Example
///
/// ```no_run
/// use vault_auth_spiffe::{MetricsErrorKind, MetricsRecorder};
///
/// struct MyMetrics;
///
/// impl MetricsRecorder for MyMetrics {
///     fn record_update(&self) {}
///
///     fn record_error(&self, kind: MetricsErrorKind) {
///         println!("Error: {}", kind.as_str());
///     }
/// }
/// ```
pub trait MetricsRecorder: Send + Sync {
    /// Records that a new JWT-SVID was cached.
    fn record_update(&self);

    /// Records an error with a structured error kind.
    fn record_error(&self, kind: MetricsErrorKind);
}
