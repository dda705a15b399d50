//! JWT-SVID fetching.
//!
//! The watcher does not speak the Workload API itself; it calls a [`JwtFetcher`].
//! [`WorkloadApiFetcher`] is the production implementation, tests and embedders
//! can plug in their own.

use crate::constants::SPIFFE_SOCKET_ENV;
use crate::error::FetchError;
use crate::prelude::debug;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use spiffe::error::GrpcClientError;
use spiffe::workload_api::client::WorkloadApiClient;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Source of JWT-SVID tokens.
///
/// Implementations must be cancellation safe: the watcher drops the returned
/// future when the auth method shuts down while a fetch is in flight.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use vault_auth_spiffe::{FetchError, JwtFetcher};
///
/// #[derive(Debug)]
/// struct StaticFetcher(String);
///
/// #[async_trait]
/// impl JwtFetcher for StaticFetcher {
///     async fn fetch_jwt(&self, _audience: &[String]) -> Result<String, FetchError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait JwtFetcher: Send + Sync + fmt::Debug + 'static {
    /// Fetches a serialized JWT-SVID for the given audience.
    async fn fetch_jwt(&self, audience: &[String]) -> Result<String, FetchError>;
}

pub(crate) type ClientFuture =
    Pin<Box<dyn Future<Output = Result<WorkloadApiClient, FetchError>> + Send + 'static>>;
pub(crate) type ClientFactory = Arc<dyn Fn() -> ClientFuture + Send + Sync + 'static>;

/// [`JwtFetcher`] backed by the SPIFFE Workload API.
///
/// The client connection is created lazily, cached, and recreated once when a
/// fetch fails (for example after the agent restarted and the socket was
/// replaced).
pub struct WorkloadApiFetcher {
    make_client: ClientFactory,
    cached_client: ArcSwapOption<WorkloadApiClient>,
    client_creation_mutex: Mutex<()>,
}

impl fmt::Debug for WorkloadApiFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadApiFetcher")
            .field("make_client", &"<ClientFactory>")
            .field("connected", &self.cached_client.load().is_some())
            .finish()
    }
}

impl Default for WorkloadApiFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkloadApiFetcher {
    /// Creates a fetcher connecting to the socket named by `SPIFFE_ENDPOINT_SOCKET`.
    ///
    /// The variable is read on every connection attempt, not at construction.
    pub fn new() -> Self {
        let factory: ClientFactory = Arc::new(|| {
            Box::pin(async move {
                let endpoint = std::env::var(SPIFFE_SOCKET_ENV)
                    .map_err(|_| FetchError::MissingEndpointSocket)?;
                connect(&endpoint).await
            })
        });
        Self::with_client_factory(factory)
    }

    /// Creates a fetcher connecting to the given Workload API endpoint.
    ///
    /// Accepts either a filesystem path or a `unix:` URI
    /// (e.g. `unix:/tmp/spire-agent/public/api.sock`).
    pub fn with_endpoint(endpoint: impl AsRef<str>) -> Self {
        let endpoint: Arc<str> = Arc::from(endpoint.as_ref());
        let factory: ClientFactory = Arc::new(move || {
            let endpoint = Arc::clone(&endpoint);
            Box::pin(async move { connect(&endpoint).await })
        });
        Self::with_client_factory(factory)
    }

    pub(crate) fn with_client_factory(make_client: ClientFactory) -> Self {
        Self {
            make_client,
            cached_client: ArcSwapOption::empty(),
            client_creation_mutex: Mutex::new(()),
        }
    }

    /// Gets the cached client or creates a new one if not available.
    async fn get_or_create_client(&self) -> Result<Arc<WorkloadApiClient>, FetchError> {
        if let Some(client) = self.cached_client.load_full() {
            return Ok(client);
        }

        let _guard = self.client_creation_mutex.lock().await;

        // Another fetch may have connected while we waited.
        if let Some(client) = self.cached_client.load_full() {
            return Ok(client);
        }
        self.create_client_locked().await
    }

    async fn recreate_client(&self) -> Result<Arc<WorkloadApiClient>, FetchError> {
        let _guard = self.client_creation_mutex.lock().await;
        self.create_client_locked().await
    }

    /// Must be called while holding `client_creation_mutex`.
    async fn create_client_locked(&self) -> Result<Arc<WorkloadApiClient>, FetchError> {
        let client = Arc::new((self.make_client)().await?);
        self.cached_client.store(Some(Arc::clone(&client)));
        Ok(client)
    }

    async fn fetch_with(
        client: &WorkloadApiClient,
        audience: &[String],
    ) -> Result<String, GrpcClientError> {
        // `fetch_jwt_token` needs `&mut self`; the client is a cheap channel handle.
        let mut client = client.clone();
        client.fetch_jwt_token(audience, None).await
    }
}

async fn connect(endpoint: &str) -> Result<WorkloadApiClient, FetchError> {
    Ok(WorkloadApiClient::new_from_path(endpoint).await?)
}

#[async_trait]
impl JwtFetcher for WorkloadApiFetcher {
    async fn fetch_jwt(&self, audience: &[String]) -> Result<String, FetchError> {
        let client = self.get_or_create_client().await?;

        match Self::fetch_with(&client, audience).await {
            Ok(token) => Ok(token),
            Err(e) => {
                debug!("JWT-SVID fetch failed; reconnecting once: error={}", e);
                let client = self.recreate_client().await?;
                Ok(Self::fetch_with(&client, audience).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failing_factory(calls: Arc<AtomicUsize>) -> ClientFactory {
        let factory: ClientFactory = Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(FetchError::MissingEndpointSocket) })
        });
        factory
    }

    #[tokio::test]
    async fn test_client_creation_error_is_returned() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = WorkloadApiFetcher::with_client_factory(failing_factory(Arc::clone(&calls)));

        let err = fetcher
            .fetch_jwt(&["vault".to_owned()])
            .await
            .expect_err("no client can be created");
        assert!(matches!(err, FetchError::MissingEndpointSocket));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_creation_is_retried_on_next_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = WorkloadApiFetcher::with_client_factory(failing_factory(Arc::clone(&calls)));

        let _ = fetcher.fetch_jwt(&[]).await;
        let _ = fetcher.fetch_jwt(&[]).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(fetcher.cached_client.load().is_none());
    }

    #[test]
    fn test_debug_does_not_require_connection() {
        let fetcher = WorkloadApiFetcher::with_endpoint("unix:/tmp/agent.sock");
        let s = format!("{fetcher:?}");
        assert!(s.contains("WorkloadApiFetcher"));
    }
}
