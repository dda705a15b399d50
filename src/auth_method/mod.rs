//! The SPIFFE auth method: a cached, periodically refreshed JWT-SVID.
//!
//! [`SpiffeAuthMethod`] spawns a watcher that fetches a JWT-SVID right away and
//! then on every refresh interval. The most recent token is cached for
//! lock-free reads by [`SpiffeAuthMethod::authenticate`]; fetch failures keep
//! the previous token.
//!
//! Refresh notifications are delivered through [`CredentialUpdates`] once the
//! consumer has reported its first successful login with
//! [`SpiffeAuthMethod::cred_success`].

mod builder;
mod gate;
mod method;
mod metrics;
mod store;
mod updates;
mod watcher;

pub use builder::SpiffeAuthMethodBuilder;
pub use method::SpiffeAuthMethod;
pub use metrics::MetricsRecorder;
pub use store::Credential;
pub use updates::CredentialUpdates;
