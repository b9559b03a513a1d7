use log::warn;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

/// Source of the bearer token used for REST calls and the chat socket.
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: String);
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryCredentials {
    token: RwLock<Option<String>>,
}

impl MemoryCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }
}

impl CredentialStore for MemoryCredentials {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: String) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// The server rejected the stored credential; the user must sign in again.
    Expired,
}

/// Application-wide channel for authentication failures.
#[derive(Debug, Clone)]
pub struct AuthNotifier {
    tx: broadcast::Sender<AuthEvent>,
}

impl Default for AuthNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(8);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Drop the credential and tell every subscriber it expired.
    pub fn expire(&self, credentials: &dyn CredentialStore) {
        warn!("Credential rejected by server, clearing it");
        credentials.clear();
        // No subscribers is fine: nobody is waiting to re-authenticate.
        let _ = self.tx.send(AuthEvent::Expired);
    }
}
