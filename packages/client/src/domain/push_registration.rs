//! Push registration value object.
//!
//! ```text
//! Unregistered ──begin──▶ Pending ──complete──▶ Registered
//!       ▲                    │
//!       │                    ├──fail(PermissionDenied)──▶ PermissionDenied
//!       │                    ├──fail(TokenUnavailable)──▶ TokenUnavailable
//!       └───────reset────────┴──fail(transient)──▶ Unregistered
//! ```
//!
//! Every attempt carries a number. `reset()` (sign-out) bumps it, so a
//! completion that started before the reset is rejected as stale.

use super::{
    error::{RegistrationError, RegistrationStateError},
    value_object::{PushToken, Timestamp, UserId},
};

/// Registration lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationState {
    Unregistered,
    Pending,
    Registered,
    PermissionDenied,
    TokenUnavailable,
}

impl RegistrationState {
    /// Terminal for the current process lifetime.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::TokenUnavailable)
    }
}

/// Device push registration for the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRegistration {
    state: RegistrationState,
    token: Option<PushToken>,
    user_id: Option<UserId>,
    registered_with_backend: bool,
    last_attempt_at: Option<Timestamp>,
    attempt: u64,
    backend_failures: u32,
}

impl Default for PushRegistration {
    fn default() -> Self {
        Self::new()
    }
}

impl PushRegistration {
    pub fn new() -> Self {
        Self {
            state: RegistrationState::Unregistered,
            token: None,
            user_id: None,
            registered_with_backend: false,
            last_attempt_at: None,
            attempt: 0,
            backend_failures: 0,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    pub fn token(&self) -> Option<&PushToken> {
        self.token.as_ref()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn registered_with_backend(&self) -> bool {
        self.registered_with_backend
    }

    pub fn last_attempt_at(&self) -> Option<Timestamp> {
        self.last_attempt_at
    }

    /// Current attempt number.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Number of backend registration failures since process start.
    pub fn backend_failures(&self) -> u32 {
        self.backend_failures
    }

    /// Whether a registration for `user_id` has already succeeded.
    pub fn is_registered_for(&self, user_id: &UserId) -> bool {
        self.state == RegistrationState::Registered && self.user_id.as_ref() == Some(user_id)
    }

    /// Start a full registration attempt for `user_id`.
    ///
    /// # Returns
    ///
    /// The attempt number to pass back on completion.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the registration is `Unregistered`.
    pub fn begin(&mut self, user_id: UserId, now: Timestamp) -> Result<u64, RegistrationStateError> {
        self.expect_state(RegistrationState::Unregistered, RegistrationState::Pending)?;
        self.attempt += 1;
        self.state = RegistrationState::Pending;
        self.user_id = Some(user_id);
        self.last_attempt_at = Some(now);
        Ok(self.attempt)
    }

    /// Start a cheap re-validation of an existing registration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the registration is `Registered`.
    pub fn begin_revalidation(&mut self, now: Timestamp) -> Result<u64, RegistrationStateError> {
        self.expect_state(RegistrationState::Registered, RegistrationState::Registered)?;
        self.last_attempt_at = Some(now);
        Ok(self.attempt)
    }

    /// Finish attempt `attempt` with a device token.
    ///
    /// # Errors
    ///
    /// Returns `StaleAttempt` if the registration was reset since the attempt
    /// began, `InvalidTransition` if it is no longer pending.
    pub fn complete(
        &mut self,
        attempt: u64,
        token: PushToken,
        registered_with_backend: bool,
    ) -> Result<(), RegistrationStateError> {
        self.expect_attempt(attempt)?;
        self.expect_state(RegistrationState::Pending, RegistrationState::Registered)?;
        self.state = RegistrationState::Registered;
        self.token = Some(token);
        self.set_backend_result(registered_with_backend);
        Ok(())
    }

    /// Finish attempt `attempt` with a failure.
    ///
    /// `PermissionDenied` and `TokenUnavailable` are terminal; other failures
    /// return to `Unregistered` so the next foreground-regain retries.
    pub fn fail(
        &mut self,
        attempt: u64,
        error: &RegistrationError,
    ) -> Result<(), RegistrationStateError> {
        let next = match error {
            RegistrationError::PermissionDenied => RegistrationState::PermissionDenied,
            RegistrationError::TokenUnavailable(_) => RegistrationState::TokenUnavailable,
            RegistrationError::BackendUnreachable(_) | RegistrationError::Storage(_) => {
                RegistrationState::Unregistered
            }
        };
        self.expect_attempt(attempt)?;
        self.expect_state(RegistrationState::Pending, next)?;
        self.state = next;
        if next != RegistrationState::Unregistered {
            self.user_id = None;
        }
        Ok(())
    }

    /// Record the outcome of a backend (re-)registration for a registered token.
    pub fn record_backend_result(
        &mut self,
        attempt: u64,
        registered_with_backend: bool,
    ) -> Result<(), RegistrationStateError> {
        self.expect_attempt(attempt)?;
        self.expect_state(RegistrationState::Registered, RegistrationState::Registered)?;
        self.set_backend_result(registered_with_backend);
        Ok(())
    }

    /// Sign-out: forget the success so the next sign-in registers again.
    ///
    /// Terminal states survive; they only clear on explicit user action.
    pub fn reset(&mut self) {
        self.attempt += 1;
        self.token = None;
        self.user_id = None;
        self.registered_with_backend = false;
        if !self.state.is_terminal() {
            self.state = RegistrationState::Unregistered;
        }
    }

    /// Explicit user action (e.g. enabling notifications in settings).
    pub fn clear_terminal(&mut self) {
        if self.state.is_terminal() {
            self.attempt += 1;
            self.state = RegistrationState::Unregistered;
        }
    }

    fn set_backend_result(&mut self, registered_with_backend: bool) {
        self.registered_with_backend = registered_with_backend;
        if !registered_with_backend {
            self.backend_failures = self.backend_failures.saturating_add(1);
        }
    }

    fn expect_attempt(&self, attempt: u64) -> Result<(), RegistrationStateError> {
        if attempt != self.attempt {
            return Err(RegistrationStateError::StaleAttempt {
                attempt,
                current: self.attempt,
            });
        }
        Ok(())
    }

    fn expect_state(
        &self,
        expected: RegistrationState,
        to: RegistrationState,
    ) -> Result<(), RegistrationStateError> {
        if self.state != expected {
            return Err(RegistrationStateError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        Ok(())
    }
}
