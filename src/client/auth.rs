//! Authentication collaborator
//!
//! The synchronization core only needs two things from authentication: the
//! identifier of the signed-in user, and a notification when that changes.
//! [`SessionAuth`] is an in-process provider for the demo and the tests.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Stable identifier of a signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Source of the current user
pub trait AuthProvider: Send + Sync {
    /// Signed-in user, `None` when signed out
    fn current_user_id(&self) -> Option<UserId>;

    /// Receiver that changes whenever a user signs in or out
    fn on_auth_state_changed(&self) -> watch::Receiver<Option<UserId>>;
}

/// Auth provider driven by explicit sign-in and sign-out calls
#[derive(Debug, Clone)]
pub struct SessionAuth {
    user: Arc<watch::Sender<Option<UserId>>>,
}

impl Default for SessionAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAuth {
    /// Provider with nobody signed in
    pub fn new() -> Self {
        let (user, _) = watch::channel(None);
        Self {
            user: Arc::new(user),
        }
    }

    pub fn sign_in(&self, user: UserId) {
        tracing::info!("User {} signed in", user);
        self.user.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        if let Some(user) = self.user.send_replace(None) {
            tracing::info!("User {} signed out", user);
        }
    }
}

impl AuthProvider for SessionAuth {
    fn current_user_id(&self) -> Option<UserId> {
        self.user.borrow().clone()
    }

    fn on_auth_state_changed(&self) -> watch::Receiver<Option<UserId>> {
        self.user.subscribe()
    }
}
