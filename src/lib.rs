#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! This crate provides a Vault auto-auth method that logs in with a
//! [SPIFFE](https://github.com/spiffe/spiffe/blob/main/standards/SPIFFE.md) JWT-SVID.
//!
//! The JWT-SVID is fetched from the
//! [SPIFFE Workload API](https://github.com/spiffe/spiffe/blob/main/standards/SPIFFE_Workload_API.md)
//! right after construction and then every 10 seconds by a background watcher.
//! The most recent token is cached and turned into a login request on demand.
//!
//! ```no_run
//! use vault_auth_spiffe::{AuthConfig, SpiffeAuthMethod};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let conf: AuthConfig = serde_json::from_str(
//!     r#"{"mount_path": "spiffe", "config": {"role": "web", "audience": "vault"}}"#,
//! )?;
//! let method = SpiffeAuthMethod::from_config(Some(&conf)).await?;
//!
//! // `path` is "spiffe/login", `data` holds the role and the JWT-SVID.
//! let request = method.authenticate()?;
//!
//! // Once the login succeeded, wait for refreshed tokens.
//! method.cred_success();
//! method.new_creds().changed().await?;
//! let request = method.authenticate()?;
//!
//! method.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **`logging`** (default): emit records through the `log` crate.
//! - **`tracing`**: emit `tracing` events instead.

mod observability;
mod prelude;

pub mod auth;
pub mod auth_method;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetcher;

pub use crate::{
    auth::{AuthMethod, AuthRequest},
    auth_method::{
        Credential, CredentialUpdates, MetricsRecorder, SpiffeAuthMethod, SpiffeAuthMethodBuilder,
    },
    config::AuthConfig,
    error::{AuthMethodError, ConfigError, FetchError, MetricsErrorKind},
    fetcher::{JwtFetcher, WorkloadApiFetcher},
};

/// Creates a [`SpiffeAuthMethod`] from a host configuration.
///
/// Shorthand for [`SpiffeAuthMethod::from_config`].
///
/// # Errors
///
/// Returns [`AuthMethodError::Config`] if the configuration is absent or invalid.
pub async fn new_spiffe_auth_method(
    conf: Option<&AuthConfig>,
) -> Result<SpiffeAuthMethod, AuthMethodError> {
    SpiffeAuthMethod::from_config(conf).await
}
