//! Error types for the SPIFFE auth method.

use spiffe::error::GrpcClientError;
use std::fmt;
use thiserror::Error;

/// Errors detected while validating the auth method configuration.
///
/// These are only produced at construction time; when one is returned no
/// background task has been started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// No configuration was provided at all.
    #[error("empty config")]
    EmptyConfig,

    /// The configuration has no option map.
    #[error("empty config data")]
    EmptyConfigData,

    /// The `role` option is missing.
    #[error("missing 'role' value")]
    MissingRole,

    /// The `role` option is not a string.
    #[error("could not convert 'role' config value to string")]
    InvalidRole,

    /// The `role` option is an empty string.
    #[error("'role' value is empty")]
    EmptyRole,

    /// The `audience` option is present but not a string.
    #[error("could not convert 'audience' config value to string")]
    InvalidAudience,

    /// The `audience` option is an empty string.
    #[error("'audience' value is empty")]
    EmptyAudience,

    /// The refresh interval must be greater than zero.
    #[error("refresh interval must be greater than zero")]
    InvalidRefreshInterval,
}

/// Errors returned by [`SpiffeAuthMethod`](crate::SpiffeAuthMethod).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthMethodError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No JWT-SVID has been fetched yet.
    ///
    /// Expected until the first successful fetch completes; callers should
    /// retry later.
    #[error("spiffe jwt-svid is not available")]
    CredentialUnavailable,

    /// The auth method was shut down.
    #[error("auth method is closed")]
    Closed,

    /// The watcher did not stop within the shutdown timeout and was aborted.
    #[error("shutdown timeout exceeded")]
    ShutdownTimeout,
}

/// Errors produced while fetching a JWT-SVID.
///
/// Fetch errors never reach `authenticate` callers: the watcher logs them,
/// keeps the last good credential and tries again on the next tick.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// `SPIFFE_ENDPOINT_SOCKET` is not set and no endpoint was configured.
    #[error("missing SPIFFE endpoint socket path (SPIFFE_ENDPOINT_SOCKET)")]
    MissingEndpointSocket,

    /// The Workload API call failed.
    #[error("workload api error: {0}")]
    WorkloadApi(#[from] GrpcClientError),

    /// The Workload API returned an empty token.
    #[error("empty jwt-svid token")]
    EmptyToken,

    /// Failure reported by a custom [`JwtFetcher`](crate::JwtFetcher).
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Returns the metrics label for this error.
    pub fn kind(&self) -> MetricsErrorKind {
        match self {
            Self::EmptyToken => MetricsErrorKind::EmptyToken,
            _ => MetricsErrorKind::FetchFailed,
        }
    }
}

/// Error kinds for structured metrics reporting.
///
/// Use these stable, low-cardinality labels when recording metrics.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum MetricsErrorKind {
    /// A JWT-SVID fetch failed.
    FetchFailed,
    /// The fetched JWT-SVID was empty.
    EmptyToken,
    /// Failed to join the watcher task during shutdown.
    WatcherJoinFailed,
}

impl MetricsErrorKind {
    /// Returns a stable string representation of the error kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchFailed => "fetch_failed",
            Self::EmptyToken => "empty_token",
            Self::WatcherJoinFailed => "watcher_join_failed",
        }
    }
}

impl fmt::Display for MetricsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
