//! Host-facing auth method contract.

use crate::auth_method::CredentialUpdates;
use crate::constants::ROLE_KEY;
use crate::error::AuthMethodError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A login request to send to the secrets-management service.
#[derive(Clone, PartialEq)]
pub struct AuthRequest {
    /// Login endpoint path, `<mount_path>/login`.
    pub path: String,

    /// Extra HTTP headers for the login call, if any.
    pub headers: Option<BTreeMap<String, String>>,

    /// JSON login payload.
    pub data: Map<String, Value>,
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Everything except the role is a secret.
        let data: BTreeMap<&str, &dyn fmt::Debug> = self
            .data
            .iter()
            .map(|(k, v)| {
                let v: &dyn fmt::Debug = if k == ROLE_KEY { v } else { &"<redacted>" };
                (k.as_str(), v)
            })
            .collect();

        f.debug_struct("AuthRequest")
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("data", &data)
            .finish()
    }
}

/// Auth method driven by an auto-auth host.
///
/// The host calls [`authenticate`](AuthMethod::authenticate) to obtain a login
/// request, reports a successful login with
/// [`cred_success`](AuthMethod::cred_success), waits on
/// [`new_creds`](AuthMethod::new_creds) to learn about refreshed credentials,
/// and finally calls [`shutdown`](AuthMethod::shutdown).
#[async_trait]
pub trait AuthMethod: Send + Sync + fmt::Debug {
    /// Builds a login request from the current credential.
    fn authenticate(&self) -> Result<AuthRequest, AuthMethodError>;

    /// Returns the handle notified when new credentials are available.
    fn new_creds(&self) -> CredentialUpdates;

    /// Reports a successful login.
    fn cred_success(&self);

    /// Stops background work and waits for it to finish.
    async fn shutdown(&self);
}
