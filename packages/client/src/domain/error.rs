//! Domain layer error definitions.

use thiserror::Error;

use super::push_registration::RegistrationState;

/// Errors related to Value Objects validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueObjectError {
    /// Identifier validation error
    #[error("{kind} cannot be empty")]
    IdentifierEmpty { kind: &'static str },

    /// Identifier too long error
    #[error("{kind} cannot exceed {max} characters (got {actual})")]
    IdentifierTooLong {
        kind: &'static str,
        max: usize,
        actual: usize,
    },

    /// PushToken validation error
    #[error("PushToken cannot be empty")]
    PushTokenEmpty,

    /// Latitude out of range error
    #[error("Latitude must be within -90..=90 (got {0})")]
    LatitudeOutOfRange(f64),

    /// Longitude out of range error
    #[error("Longitude must be within -180..=180 (got {0})")]
    LongitudeOutOfRange(f64),

    /// CacheKey parse error
    #[error("Unknown cache key: {0}")]
    UnknownCacheKey(String),
}

/// Errors raised when a push registration transition is not allowed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationStateError {
    /// Transition attempted from a state that does not allow it
    #[error("Cannot move push registration from {from:?} to {to:?}")]
    InvalidTransition {
        from: RegistrationState,
        to: RegistrationState,
    },

    /// Completion belongs to an attempt that was reset in the meantime
    #[error("Push registration attempt {attempt} is stale (current: {current})")]
    StaleAttempt { attempt: u64, current: u64 },
}

/// Errors produced while obtaining or registering a push token
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The user refused the OS notification permission
    #[error("Notification permission denied")]
    PermissionDenied,

    /// No device token could be obtained (e.g. missing build configuration)
    #[error("Push token unavailable: {0}")]
    TokenUnavailable(String),

    /// The backend could not be reached or rejected the request
    #[error("Push backend unreachable: {0}")]
    BackendUnreachable(String),

    /// Local token persistence failed
    #[error("Push token storage failed: {0}")]
    Storage(String),
}

impl RegistrationError {
    /// Whether the failure ends registration attempts for this process lifetime.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::TokenUnavailable(_))
    }
}

/// Errors surfaced by the live channel
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Connection-level failure (handshake, I/O, close)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unknown real-time payload
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

/// Errors returned by the REST backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No bearer token is available
    #[error("Not signed in")]
    MissingToken,

    /// The backend rejected the bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Non-success status other than 401
    #[error("Unexpected status {status} from {path}")]
    Status { status: u16, path: String },

    /// Network or decoding failure
    #[error("Request failed: {0}")]
    Transport(String),
}

/// Failure to schedule a local notification
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Failed to schedule notification: {0}")]
pub struct NotificationError(pub String);
