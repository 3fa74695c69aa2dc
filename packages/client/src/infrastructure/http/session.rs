//! In-process credential holder.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::{AuthSession, TokenProvider};

/// Token provider backed by the shared auth session.
///
/// Signing out publishes an idle session, which the coordinator observes
/// like any other auth change.
pub struct SessionTokenProvider {
    session: watch::Sender<AuthSession>,
}

impl SessionTokenProvider {
    pub fn new(session: watch::Sender<AuthSession>) -> Self {
        Self { session }
    }

    /// Replace the current session (sign-in or sign-out from the UI).
    pub fn publish(&self, session: AuthSession) {
        self.session.send_replace(session);
    }

    pub fn current(&self) -> AuthSession {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSession> {
        self.session.subscribe()
    }
}

#[async_trait]
impl TokenProvider for SessionTokenProvider {
    async fn get_token(&self) -> Option<String> {
        let session = self.session.borrow();
        if session.is_authenticated() {
            session.token.clone()
        } else {
            None
        }
    }

    async fn sign_out(&self) {
        self.session.send_replace(AuthSession::idle());
    }
}
