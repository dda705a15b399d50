use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// A serialized JWT-SVID.
///
/// The token is a bearer credential: `Debug` output is redacted and the
/// backing memory is zeroed when the last reference is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    pub(crate) fn new(token: String) -> Self {
        Self(Zeroizing::new(token))
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"<redacted>").finish()
    }
}

/// Single-slot holder for the latest credential.
///
/// Readers load the current value without blocking; the watcher is the only
/// writer and always replaces the whole value.
#[derive(Default)]
pub(crate) struct CredentialStore {
    latest: ArcSwapOption<Credential>,
}

impl CredentialStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn load(&self) -> Option<Arc<Credential>> {
        self.latest.load_full()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.latest.load().is_none()
    }

    /// Publishes `token` unless it equals the cached value.
    ///
    /// Returns `true` when the cached credential was replaced.
    pub(crate) fn replace_if_changed(&self, token: String) -> bool {
        if self
            .latest
            .load()
            .as_deref()
            .is_some_and(|current| current.as_str() == token)
        {
            return false;
        }
        self.latest.store(Some(Arc::new(Credential::new(token))));
        true
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("cached", &!self.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let store = CredentialStore::new();
        assert!(store.is_empty());
        assert!(store.load().is_none());
    }

    #[test]
    fn test_replace_deduplicates_by_value() {
        let store = CredentialStore::new();
        assert!(store.replace_if_changed("token-1".to_owned()));
        assert!(!store.replace_if_changed("token-1".to_owned()));
        assert!(store.replace_if_changed("token-2".to_owned()));
        assert_eq!(store.load().unwrap().as_str(), "token-2");
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let store = CredentialStore::new();
        store.replace_if_changed("old".to_owned());
        let snapshot = store.load().unwrap();
        store.replace_if_changed("new".to_owned());
        assert_eq!(snapshot.as_str(), "old");
        assert_eq!(store.load().unwrap().as_str(), "new");
    }

    #[test]
    fn test_debug_is_redacted() {
        let cred = Credential::new("secret.jwt.value".to_owned());
        let s = format!("{cred:?}");
        assert!(!s.contains("secret"));
        assert!(s.contains("<redacted>"));
    }
}
