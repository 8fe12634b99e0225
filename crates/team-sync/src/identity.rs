//! Identity provider integration.
//!
//! The engine may be constructed before sign-in completes. Every team
//! operation waits for (or requires) a resolved identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable opaque id
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl UserIdentity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }
}

/// Source of the signed-in identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Wait until sign-in state is known. `None` means nobody is signed in.
    async fn resolve(&self) -> Option<UserIdentity>;
}

/// An identity known up front.
pub struct StaticIdentity(pub Option<UserIdentity>);

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn resolve(&self) -> Option<UserIdentity> {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AuthState {
    Pending,
    SignedIn(UserIdentity),
    SignedOut,
}

/// Identity that resolves later, once the host's sign-in flow finishes.
///
/// `resolve` blocks until `sign_in` or `sign_out` is called.
pub struct IdentityCell {
    tx: watch::Sender<AuthState>,
}

impl Default for IdentityCell {
    fn default() -> Self {
        Self {
            tx: watch::Sender::new(AuthState::Pending),
        }
    }
}

impl IdentityCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, identity: UserIdentity) {
        self.tx.send_replace(AuthState::SignedIn(identity));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(AuthState::SignedOut);
    }

    /// Current identity without waiting.
    pub fn current(&self) -> Option<UserIdentity> {
        match &*self.tx.borrow() {
            AuthState::SignedIn(identity) => Some(identity.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl IdentityProvider for IdentityCell {
    async fn resolve(&self) -> Option<UserIdentity> {
        let mut rx = self.tx.subscribe();
        let state = match rx.wait_for(|s| *s != AuthState::Pending).await {
            Ok(state) => state.clone(),
            // The sender lives in self, so this cannot be closed while we borrow it
            Err(_) => AuthState::SignedOut,
        };
        match state {
            AuthState::SignedIn(identity) => Some(identity),
            _ => None,
        }
    }
}
