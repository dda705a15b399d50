use super::method::SpiffeAuthMethod;
use super::metrics::MetricsRecorder;
use crate::config::Settings;
use crate::constants::DEFAULT_REFRESH_INTERVAL;
use crate::error::{AuthMethodError, ConfigError};
use crate::fetcher::{JwtFetcher, WorkloadApiFetcher};
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`SpiffeAuthMethod`].
///
/// Use this when you need explicit configuration (socket path, custom fetcher,
/// refresh interval, metrics) instead of the host option map.
///
/// # Example
///
/// ```no_run
/// use vault_auth_spiffe::SpiffeAuthMethod;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let method = SpiffeAuthMethod::builder()
///     .role("web")
///     .audience("vault")
///     .mount_path("auth/spiffe")
///     .endpoint("unix:/tmp/spire-agent/public/api.sock")
///     .refresh_interval(Duration::from_secs(30))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SpiffeAuthMethodBuilder {
    role: Option<String>,
    audience: Option<String>,
    mount_path: String,
    refresh_interval: Duration,
    fetcher: Option<Arc<dyn JwtFetcher>>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    shutdown_timeout: Option<Duration>,
}

impl Debug for SpiffeAuthMethodBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiffeAuthMethodBuilder")
            .field("role", &self.role)
            .field("audience", &self.audience)
            .field("mount_path", &self.mount_path)
            .field("refresh_interval", &self.refresh_interval)
            .field("fetcher", &self.fetcher)
            .field(
                "metrics",
                &self.metrics.as_ref().map(|_| "<MetricsRecorder>"),
            )
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl Default for SpiffeAuthMethodBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiffeAuthMethodBuilder {
    /// Creates a new `SpiffeAuthMethodBuilder`.
    pub fn new() -> Self {
        Self {
            role: None,
            audience: None,
            mount_path: String::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            fetcher: None,
            metrics: None,
            shutdown_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Sets the Vault role to log in with. Required.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Sets the audience requested for the JWT-SVID.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the mount path of the auth backend.
    #[must_use]
    pub fn mount_path(mut self, mount_path: impl Into<String>) -> Self {
        self.mount_path = mount_path.into();
        self
    }

    /// Sets the interval between two JWT-SVID fetches.
    ///
    /// Defaults to 10 seconds. A zero interval is rejected by [`build`](Self::build).
    #[must_use]
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Sets the Workload API endpoint.
    ///
    /// Accepts either a filesystem path (e.g. `/tmp/spire-agent/public/api.sock`)
    /// or a `unix:` URI. Replaces any fetcher set with [`fetcher`](Self::fetcher).
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl AsRef<str>) -> Self {
        self.fetcher = Some(Arc::new(WorkloadApiFetcher::with_endpoint(endpoint)));
        self
    }

    /// Sets a custom JWT-SVID fetcher.
    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn JwtFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets a metrics recorder.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets the timeout used by [`SpiffeAuthMethod::shutdown_configured`].
    ///
    /// Defaults to 30 seconds; `None` waits indefinitely.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validates the configuration and starts the auth method.
    ///
    /// Must be called from within a Tokio runtime with the time driver enabled.
    ///
    /// # Errors
    ///
    /// Returns [`AuthMethodError::Config`] if the role is missing or empty,
    /// the audience is empty, or the refresh interval is zero.
    pub async fn build(self) -> Result<SpiffeAuthMethod, AuthMethodError> {
        let role = self.role.ok_or(ConfigError::MissingRole)?;
        let settings = Settings::new(self.mount_path, &role, self.audience.as_deref())?;
        let fetcher: Arc<dyn JwtFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(WorkloadApiFetcher::new()),
        };

        SpiffeAuthMethod::build_with(
            settings,
            self.refresh_interval,
            fetcher,
            self.metrics,
            self.shutdown_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_requires_role() {
        let err = SpiffeAuthMethodBuilder::new()
            .audience("vault")
            .build()
            .await
            .expect_err("role is required");
        assert!(matches!(err, AuthMethodError::Config(ConfigError::MissingRole)));
    }

    #[tokio::test]
    async fn test_build_rejects_empty_values() {
        let err = SpiffeAuthMethodBuilder::new()
            .role("")
            .build()
            .await
            .expect_err("empty role");
        assert!(matches!(err, AuthMethodError::Config(ConfigError::EmptyRole)));

        let err = SpiffeAuthMethodBuilder::new()
            .role("web")
            .audience("")
            .build()
            .await
            .expect_err("empty audience");
        assert!(matches!(err, AuthMethodError::Config(ConfigError::EmptyAudience)));
    }

    #[tokio::test]
    async fn test_build_applies_settings() {
        let method = SpiffeAuthMethodBuilder::new()
            .role("web")
            .audience("vault")
            .mount_path("auth/spiffe")
            .endpoint("unix:/tmp/does-not-exist.sock")
            .refresh_interval(Duration::from_secs(60))
            .build()
            .await
            .expect("valid configuration");

        assert_eq!(method.role(), "web");
        assert_eq!(method.audience(), Some("vault"));
        assert_eq!(method.mount_path(), "auth/spiffe");
        assert_eq!(method.refresh_interval(), Duration::from_secs(60));
        method.shutdown().await;
    }

    #[test]
    fn test_builder_defaults() {
        let builder = SpiffeAuthMethodBuilder::default();
        assert_eq!(builder.refresh_interval, DEFAULT_REFRESH_INTERVAL);
        assert_eq!(builder.shutdown_timeout, Some(Duration::from_secs(30)));
        assert!(builder.fetcher.is_none());
    }
}
