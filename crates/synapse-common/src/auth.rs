//! Explicit credentials context.
//!
//! Every component that talks to the backend takes an [`AuthSession`]
//! instead of reading tokens from ambient storage. The host creates one on
//! login and drops it on logout.

use std::fmt;

/// Credentials and identity for one logged-in user.
#[derive(Clone)]
pub struct AuthSession {
    pub user_id: String,
    pub username: String,
    token: String,
}

impl AuthSession {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            token: token.into(),
        }
    }

    /// The raw bearer token. Callers attach it as `Authorization: Bearer`.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
