//! Host-provided auth method configuration and its validation.

use crate::constants::{AUDIENCE_KEY, ROLE_KEY};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Auth method configuration as handed over by the host agent.
///
/// `config` holds the untyped option map from the agent configuration file.
/// Recognized keys are `role` (required) and `audience` (optional).
///
/// # Examples
///
/// ```
/// use vault_auth_spiffe::AuthConfig;
///
/// let conf: AuthConfig = serde_json::from_str(
///     r#"{"mount_path": "spiffe", "config": {"role": "web", "audience": "vault"}}"#,
/// )?;
/// assert_eq!(conf.mount_path, "spiffe");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Mount path of the auth backend, used to build the login endpoint.
    #[serde(default)]
    pub mount_path: String,

    /// Auth method specific options.
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
}

impl AuthConfig {
    /// Creates a configuration with the given mount path and option map.
    pub fn new(mount_path: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            mount_path: mount_path.into(),
            config: Some(config),
        }
    }
}

/// Validated, immutable settings the auth method runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) mount_path: String,
    pub(crate) role: String,
    pub(crate) audience: Option<String>,
}

impl Settings {
    /// Validates a host configuration.
    ///
    /// Checks run in a fixed order so the reported error is deterministic:
    /// presence of the config and its map, then the types of `role` and
    /// `audience`, then emptiness.
    pub(crate) fn from_auth_config(conf: Option<&AuthConfig>) -> Result<Self, ConfigError> {
        let conf = conf.ok_or(ConfigError::EmptyConfig)?;
        let data = conf.config.as_ref().ok_or(ConfigError::EmptyConfigData)?;

        let role = data
            .get(ROLE_KEY)
            .ok_or(ConfigError::MissingRole)?
            .as_str()
            .ok_or(ConfigError::InvalidRole)?;

        let audience = match data.get(AUDIENCE_KEY) {
            None => None,
            Some(v) => Some(v.as_str().ok_or(ConfigError::InvalidAudience)?),
        };

        Self::new(conf.mount_path.clone(), role, audience)
    }

    pub(crate) fn new(
        mount_path: String,
        role: &str,
        audience: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if role.is_empty() {
            return Err(ConfigError::EmptyRole);
        }
        if audience.is_some_and(str::is_empty) {
            return Err(ConfigError::EmptyAudience);
        }

        Ok(Self {
            mount_path,
            role: role.to_owned(),
            audience: audience.map(str::to_owned),
        })
    }

    /// Audience list passed to the fetcher; empty when no audience is configured.
    pub(crate) fn audiences(&self) -> Vec<String> {
        self.audience.iter().cloned().collect()
    }
}
