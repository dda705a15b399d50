use crate::error::AuthMethodError;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Handle for receiving "new credential available" notifications.
///
/// Obtained from [`SpiffeAuthMethod::new_creds`](crate::SpiffeAuthMethod::new_creds).
/// After a notification the consumer is expected to call `authenticate` again
/// to pick up the fresh token.
///
/// Clones share one underlying channel: each notification is delivered to
/// exactly one waiting handle.
///
/// Notifications are only produced after
/// [`cred_success`](crate::SpiffeAuthMethod::cred_success) has been called.
/// The channel holds a single pending notification; while it is unconsumed the
/// background watcher waits before announcing the next credential, so a consumer
/// must keep draining the handle once it has signalled success.
///
/// # Examples
///
/// ```no_run
/// # use vault_auth_spiffe::SpiffeAuthMethod;
/// # async fn example(method: SpiffeAuthMethod) -> Result<(), Box<dyn std::error::Error>> {
/// let updates = method.new_creds();
/// loop {
///     updates.changed().await?;
///     let request = method.authenticate()?;
///     // log in again with `request`
/// #   let _ = request;
/// }
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct CredentialUpdates {
    rx: Arc<Mutex<mpsc::Receiver<()>>>,
}

impl CredentialUpdates {
    pub(crate) fn channel() -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel(1);
        (
            tx,
            Self {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Waits for the next notification.
    ///
    /// # Errors
    ///
    /// Returns [`AuthMethodError::Closed`] once the auth method has been shut
    /// down and no notification is pending.
    pub async fn changed(&self) -> Result<(), AuthMethodError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(AuthMethodError::Closed)
    }

    /// Consumes a pending notification without waiting.
    ///
    /// Returns `true` if a notification was pending.
    pub fn try_changed(&self) -> bool {
        match self.rx.try_lock() {
            Ok(mut rx) => rx.try_recv().is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_changed_resolves_after_send() {
        let (tx, updates) = CredentialUpdates::channel();
        tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), updates.changed())
            .await
            .expect("should complete within timeout")
            .expect("channel is open");
    }

    #[tokio::test]
    async fn test_single_pending_slot() {
        let (tx, updates) = CredentialUpdates::channel();
        tx.send(()).await.unwrap();
        assert!(tx.try_send(()).is_err());

        assert!(updates.try_changed());
        assert!(!updates.try_changed());
        assert!(tx.try_send(()).is_ok());
    }

    #[tokio::test]
    async fn test_changed_reports_closed_when_sender_dropped() {
        let (tx, updates) = CredentialUpdates::channel();
        drop(tx);
        assert!(matches!(updates.changed().await, Err(AuthMethodError::Closed)));
    }

    #[tokio::test]
    async fn test_clones_share_notifications() {
        let (tx, updates) = CredentialUpdates::channel();
        let other = updates.clone();
        tx.send(()).await.unwrap();

        assert!(other.try_changed());
        assert!(!updates.try_changed());
    }
}
