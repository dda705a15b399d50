use super::builder::SpiffeAuthMethodBuilder;
use super::gate::SignalGate;
use super::metrics::MetricsRecorder;
use super::store::{Credential, CredentialStore};
use super::updates::CredentialUpdates;
use super::watcher::Watcher;
use crate::auth::{AuthMethod, AuthRequest};
use crate::config::{AuthConfig, Settings};
use crate::constants::{DEFAULT_REFRESH_INTERVAL, JWT_KEY, LOGIN_PATH, ROLE_KEY};
use crate::error::{AuthMethodError, ConfigError, MetricsErrorKind};
use crate::fetcher::{JwtFetcher, WorkloadApiFetcher};
use crate::prelude::{info, trace, warn};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Vault auto-auth method logging in with a SPIFFE JWT-SVID.
///
/// Construction validates the configuration and spawns a background watcher
/// that fetches a JWT-SVID immediately and then on every refresh interval.
/// The latest token is cached and served by [`SpiffeAuthMethod::authenticate`].
///
/// The handle owns the watcher: call [`SpiffeAuthMethod::shutdown`] to stop it
/// and wait for it to exit. Dropping the handle only signals cancellation.
///
/// # Examples
///
/// ```no_run
/// use vault_auth_spiffe::SpiffeAuthMethod;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let method = SpiffeAuthMethod::builder()
///     .role("web")
///     .audience("vault")
///     .mount_path("auth/spiffe")
///     .build()
///     .await?;
///
/// // Fails with `CredentialUnavailable` until the first fetch completes.
/// let request = method.authenticate()?;
/// assert_eq!(request.path, "auth/spiffe/login");
///
/// // After the first successful login, start listening for refreshes.
/// method.cred_success();
///
/// method.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct SpiffeAuthMethod {
    inner: Arc<Inner>,
}

pub(super) struct Inner {
    settings: Settings,
    refresh_interval: Duration,

    // Last fetched JWT-SVID, replaced wholesale by the watcher.
    store: CredentialStore,
    gate: SignalGate,
    new_creds: CredentialUpdates,

    fetcher: Arc<dyn JwtFetcher>,
    metrics: Option<Arc<dyn MetricsRecorder>>,

    // Lifecycle / shutdown.
    closed: AtomicBool,
    cancel: CancellationToken,
    shutdown_timeout: Option<Duration>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    pub(super) fn settings(&self) -> &Settings {
        &self.settings
    }
    pub(super) const fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
    pub(super) fn store(&self) -> &CredentialStore {
        &self.store
    }
    pub(super) fn gate(&self) -> &SignalGate {
        &self.gate
    }
    pub(super) fn fetcher(&self) -> &Arc<dyn JwtFetcher> {
        &self.fetcher
    }

    pub(super) fn record_update(&self) {
        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_update();
        }
    }

    pub(super) fn record_error(&self, kind: MetricsErrorKind) {
        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_error(kind);
        }
    }
}

impl Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiffeAuthMethod")
            .field("mount_path", &self.settings.mount_path)
            .field("role", &self.settings.role)
            .field("audience", &self.settings.audience)
            .field("refresh_interval", &self.refresh_interval)
            .field("store", &self.store)
            .field("gate_open", &self.gate.is_open())
            .field("fetcher", &self.fetcher)
            .field(
                "metrics",
                &self.metrics.as_ref().map(|_| "<MetricsRecorder>"),
            )
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("cancel", &self.cancel)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl Debug for SpiffeAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl SpiffeAuthMethod {
    /// Creates the auth method from a host configuration.
    ///
    /// The option map must contain a non-empty string `role`; `audience` is
    /// optional but, when present, must be a non-empty string. Tokens are
    /// fetched from the Workload API socket named by `SPIFFE_ENDPOINT_SOCKET`
    /// every 10 seconds.
    ///
    /// Must be called from within a Tokio runtime with the time driver enabled.
    ///
    /// # Errors
    ///
    /// Returns [`AuthMethodError::Config`] if the configuration is absent or
    /// invalid. No background task is started in that case.
    pub async fn from_config(conf: Option<&AuthConfig>) -> Result<Self, AuthMethodError> {
        let settings = Settings::from_auth_config(conf)?;
        Self::build_with(
            settings,
            DEFAULT_REFRESH_INTERVAL,
            Arc::new(WorkloadApiFetcher::new()),
            None,
            None,
        )
        .await
    }

    /// Creates a builder for configuring a [`SpiffeAuthMethod`].
    pub fn builder() -> SpiffeAuthMethodBuilder {
        SpiffeAuthMethodBuilder::new()
    }

    /// Returns the login request for the cached JWT-SVID.
    ///
    /// The request targets `<mount_path>/login` with no extra headers and a
    /// payload of `role` and `jwt`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthMethodError::CredentialUnavailable`] if no JWT-SVID has
    /// been fetched yet.
    pub fn authenticate(&self) -> Result<AuthRequest, AuthMethodError> {
        trace!("beginning authentication");

        let credential = self
            .inner
            .store
            .load()
            .ok_or(AuthMethodError::CredentialUnavailable)?;

        Ok(self.login_request(&credential))
    }

    fn login_request(&self, credential: &Credential) -> AuthRequest {
        let settings = &self.inner.settings;

        let mut data = Map::new();
        data.insert(ROLE_KEY.to_owned(), Value::String(settings.role.clone()));
        data.insert(
            JWT_KEY.to_owned(),
            Value::String(credential.as_str().to_owned()),
        );

        AuthRequest {
            path: format!("{}/{LOGIN_PATH}", settings.mount_path),
            headers: None,
            data,
        }
    }

    /// Returns a handle notified whenever a refreshed JWT-SVID is cached.
    ///
    /// No notification is sent for credentials cached before
    /// [`SpiffeAuthMethod::cred_success`] was first called.
    pub fn new_creds(&self) -> CredentialUpdates {
        self.inner.new_creds.clone()
    }

    /// Reports that a login with the current credential succeeded.
    ///
    /// The first call enables refresh notifications; later calls have no effect.
    pub fn cred_success(&self) {
        if self.inner.gate.open() {
            trace!("initial authentication succeeded; enabling credential notifications");
        }
    }

    /// Returns `true` if the auth method is running and holds a credential.
    ///
    /// **Note:** This check is inherently racy and intended for monitoring.
    pub fn is_healthy(&self) -> bool {
        !self.is_closed() && !self.inner.store.is_empty()
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire) || self.inner.cancel.is_cancelled()
    }

    /// Role sent in the login payload.
    pub fn role(&self) -> &str {
        &self.inner.settings.role
    }

    /// Audience requested for the JWT-SVID, if configured.
    pub fn audience(&self) -> Option<&str> {
        self.inner.settings.audience.as_deref()
    }

    /// Mount path of the auth backend.
    pub fn mount_path(&self) -> &str {
        &self.inner.settings.mount_path
    }

    /// Interval between two JWT-SVID fetches.
    pub fn refresh_interval(&self) -> Duration {
        self.inner.refresh_interval
    }

    /// Stops the watcher and waits for it to exit.
    ///
    /// An in-flight fetch or a pending notification is abandoned. Calling this
    /// more than once is safe; later calls return immediately.
    ///
    /// **Note:** This method may wait indefinitely if the fetcher does not
    /// yield. Use [`SpiffeAuthMethod::shutdown_with_timeout`] to bound it.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.watcher.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Error joining watcher task during shutdown: error={e}");
                self.inner.record_error(MetricsErrorKind::WatcherJoinFailed);
            }
        }
        info!("spiffe auth method shut down");
    }

    /// Stops the watcher and waits for it to exit, aborting it after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthMethodError::ShutdownTimeout`] if the watcher did not exit
    /// in time and had to be aborted.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), AuthMethodError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.cancel.cancel();

        let Some(mut handle) = self.inner.watcher.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!("Error joining watcher task during shutdown: error={e}");
                self.inner.record_error(MetricsErrorKind::WatcherJoinFailed);
                Ok(())
            }
            Err(_) => {
                warn!("Shutdown timeout exceeded; aborting watcher task");
                handle.abort();
                let _unused: Result<_, _> = handle.await;
                Err(AuthMethodError::ShutdownTimeout)
            }
        }
    }

    /// Stops the watcher using the timeout configured in the builder.
    ///
    /// Without a configured timeout this behaves like [`SpiffeAuthMethod::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthMethodError::ShutdownTimeout`] if the configured timeout is exceeded.
    pub async fn shutdown_configured(&self) -> Result<(), AuthMethodError> {
        if let Some(timeout) = self.inner.shutdown_timeout {
            self.shutdown_with_timeout(timeout).await
        } else {
            self.shutdown().await;
            Ok(())
        }
    }

    pub(super) async fn build_with(
        settings: Settings,
        refresh_interval: Duration,
        fetcher: Arc<dyn JwtFetcher>,
        metrics: Option<Arc<dyn MetricsRecorder>>,
        shutdown_timeout: Option<Duration>,
    ) -> Result<Self, AuthMethodError> {
        if refresh_interval.is_zero() {
            return Err(ConfigError::InvalidRefreshInterval.into());
        }

        let (notify_tx, new_creds) = CredentialUpdates::channel();
        let cancel = CancellationToken::new();

        let inner = Arc::new(Inner {
            settings,
            refresh_interval,
            store: CredentialStore::new(),
            gate: SignalGate::new(),
            new_creds,
            fetcher,
            metrics,
            closed: AtomicBool::new(false),
            cancel: cancel.clone(),
            shutdown_timeout,
            watcher: Mutex::new(None),
        });

        let watcher = Watcher::new(Arc::clone(&inner), notify_tx, cancel);
        let handle = tokio::spawn(watcher.run());
        *inner.watcher.lock().await = Some(handle);

        info!("spiffe auth method created");

        Ok(Self { inner })
    }
}

impl Drop for SpiffeAuthMethod {
    fn drop(&mut self) {
        // Best-effort cancellation. Do not block in Drop.
        self.inner.cancel.cancel();
    }
}

#[async_trait]
impl AuthMethod for SpiffeAuthMethod {
    fn authenticate(&self) -> Result<AuthRequest, AuthMethodError> {
        SpiffeAuthMethod::authenticate(self)
    }

    fn new_creds(&self) -> CredentialUpdates {
        SpiffeAuthMethod::new_creds(self)
    }

    fn cred_success(&self) {
        SpiffeAuthMethod::cred_success(self);
    }

    async fn shutdown(&self) {
        SpiffeAuthMethod::shutdown(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    #[derive(Debug)]
    struct PendingFetcher;

    #[async_trait]
    impl JwtFetcher for PendingFetcher {
        async fn fetch_jwt(&self, _audience: &[String]) -> Result<String, FetchError> {
            std::future::pending().await
        }
    }

    async fn method() -> SpiffeAuthMethod {
        let settings = Settings::new("spiffe".to_owned(), "test-role", Some("test-audience"))
            .expect("valid settings");
        SpiffeAuthMethod::build_with(
            settings,
            Duration::from_secs(10),
            Arc::new(PendingFetcher),
            None,
            None,
        )
        .await
        .expect("auth method")
    }

    #[tokio::test]
    async fn test_authenticate_without_credential() {
        let m = method().await;
        let err = m.authenticate().expect_err("no credential yet");
        assert!(matches!(err, AuthMethodError::CredentialUnavailable));
        assert_eq!(err.to_string(), "spiffe jwt-svid is not available");
        m.shutdown().await;
    }

    #[tokio::test]
    async fn test_authenticate_with_cached_credential() {
        let m = method().await;
        m.inner.store.replace_if_changed("test-token".to_owned());

        let request = m.authenticate().expect("credential cached");
        assert_eq!(request.path, "spiffe/login");
        assert!(request.headers.is_none());
        assert_eq!(
            Value::Object(request.data),
            serde_json::json!({"role": "test-role", "jwt": "test-token"})
        );
        m.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_refresh_interval_is_rejected() {
        let settings = Settings::new(String::new(), "r", None).unwrap();
        let err = SpiffeAuthMethod::build_with(
            settings,
            Duration::ZERO,
            Arc::new(PendingFetcher),
            None,
            None,
        )
        .await
        .expect_err("zero interval");
        assert!(matches!(
            err,
            AuthMethodError::Config(ConfigError::InvalidRefreshInterval)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let m = method().await;
        m.shutdown().await;
        m.shutdown().await;
        assert!(m.shutdown_with_timeout(Duration::from_millis(10)).await.is_ok());
        assert!(m.inner.watcher.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_is_healthy_tracks_credential_and_lifecycle() {
        let m = method().await;
        assert!(!m.is_healthy());
        m.inner.store.replace_if_changed("t".to_owned());
        assert!(m.is_healthy());
        m.shutdown().await;
        assert!(!m.is_healthy());
    }

    #[tokio::test]
    async fn test_debug_does_not_leak_token() {
        let m = method().await;
        m.inner.store.replace_if_changed("super-secret-token".to_owned());
        let s = format!("{m:?}");
        assert!(s.contains("test-role"));
        assert!(!s.contains("super-secret-token"));
        m.shutdown().await;
    }
}
