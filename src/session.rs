//! Bearer-token session owned by a single authentication service.
//!
//! Clients never read tokens from ambient state; they receive an
//! [`AuthService`] handle and ask it for the current token on every request.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: Option<String>,
}

/// Shared handle to the process-wide session. Cloning shares the session.
#[derive(Debug, Clone, Default)]
pub struct AuthService {
    inner: Arc<RwLock<Option<Session>>>,
}

impl AuthService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service already holding `token`; blank tokens leave it logged out.
    pub fn with_token(token: impl Into<String>) -> Self {
        let service = Self::new();
        service.login(token, None);
        service
    }

    pub fn login(&self, token: impl Into<String>, user: Option<String>) {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            tracing::warn!("ignoring login with an empty token");
            return;
        }
        *self.write() = Some(Session { token, user });
    }

    pub fn logout(&self) {
        if self.write().take().is_some() {
            tracing::info!("session cleared");
        }
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.token.clone())
    }

    pub fn session(&self) -> Option<Session> {
        self.read().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.token().is_some()
    }

    // Every write is a single assignment; a poisoned session is still whole.
    fn read(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.inner.read().unwrap_or_else(|poisoned| {
            tracing::error!("session lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.inner.write().unwrap_or_else(|poisoned| {
            tracing::error!("session lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_session() {
        let auth = AuthService::new();
        let handle = auth.clone();
        auth.login("abc", Some("admin".into()));
        assert_eq!(handle.token().as_deref(), Some("abc"));
        assert_eq!(handle.session().unwrap().user.as_deref(), Some("admin"));

        handle.logout();
        assert!(!auth.is_logged_in());
    }

    #[test]
    fn logout_survives_poisoned_lock() {
        let auth = AuthService::with_token("abc");
        let inner = Arc::clone(&auth.inner);
        let _ = std::thread::spawn(move || {
            let _guard = inner.write().unwrap();
            panic!("poison the session lock");
        })
        .join();
        assert!(auth.inner.is_poisoned());

        assert_eq!(auth.token().as_deref(), Some("abc"));
        auth.logout();
        assert!(!auth.is_logged_in());
        auth.login("def", None);
        assert_eq!(auth.token().as_deref(), Some("def"));
    }

    #[test]
    fn blank_token_stays_logged_out() {
        let auth = AuthService::with_token("   ");
        assert!(auth.token().is_none());
    }
}
