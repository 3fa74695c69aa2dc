//! Ports implemented by the infrastructure layer.
//!
//! Use cases depend on these traits only; concrete transports, caches and
//! platform integrations live in `crate::infrastructure`.

use async_trait::async_trait;

use super::{
    cache_key::CacheKey,
    error::{ApiError, NotificationError, RegistrationError},
    event::{ChannelConnectionState, ConnectionHandle, Topic},
    notification::LocalNotification,
    value_object::{PushToken, Timestamp},
};

/// Where and how to open the live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEndpoint {
    pub url: String,
    pub bearer_token: Option<String>,
}

/// Live bidirectional connection to the notification service.
///
/// Events are not returned from these methods; the implementation posts
/// generation-tagged envelopes to the queue it was constructed with.
#[cfg_attr(test, mockall::automock)]
pub trait RealtimeChannel: Send {
    fn state(&self) -> ChannelConnectionState;

    /// Open the connection. Returns the existing handle when already
    /// connected or connecting.
    fn connect(&mut self, endpoint: ChannelEndpoint) -> ConnectionHandle;

    /// Tear down the connection and cancel pending reconnects. Never fails.
    fn disconnect(&mut self);

    /// Best-effort; a no-op with a warning when not connected.
    fn subscribe(&self, topic: Topic, id: &str);

    /// Best-effort; a no-op with a warning when not connected.
    fn unsubscribe(&self, topic: Topic, id: &str);

    /// Whether events tagged with `generation` may still be delivered.
    fn is_current(&self, generation: u64) -> bool;
}

/// A cached query result.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuery {
    pub value: serde_json::Value,
    pub fetched_at: Timestamp,
    pub stale: bool,
}

/// Query result cache keyed by `CacheKey`.
#[cfg_attr(test, mockall::automock)]
pub trait QueryCache: Send + Sync {
    /// Mark `key` stale. Returns `true` if a fresh entry was marked;
    /// invalidating a missing or already stale key is a no-op.
    fn invalidate(&self, key: &CacheKey) -> bool;

    fn get(&self, key: &CacheKey) -> Option<CachedQuery>;

    /// Store a freshly fetched result.
    fn put(&self, key: CacheKey, value: serde_json::Value, fetched_at: Timestamp);

    /// Number of invalidations seen for `key`, including no-op ones.
    fn revision(&self, key: &CacheKey) -> u64;

    /// Store a result fetched after reading `revision`.
    ///
    /// If `key` was invalidated in the meantime the entry is stored stale and
    /// `false` is returned.
    fn put_fetched(
        &self,
        key: CacheKey,
        value: serde_json::Value,
        fetched_at: Timestamp,
        revision: u64,
    ) -> bool;

    /// Keys whose entries are stale, in key order.
    fn stale_keys(&self) -> Vec<CacheKey>;
}

/// Schedules notifications on the device.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationScheduler: Send + Sync {
    fn schedule(&self, notification: LocalNotification) -> Result<(), NotificationError>;
}

/// OS notification permission outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Platform push service (permission prompt and device token).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushPlatform: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;

    async fn device_token(&self) -> Result<PushToken, RegistrationError>;
}

/// Local persistence for the device push token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushTokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<PushToken>, RegistrationError>;

    async fn save(&self, token: &PushToken) -> Result<(), RegistrationError>;

    async fn clear(&self) -> Result<(), RegistrationError>;
}

/// Backend endpoint receiving push tokens.
///
/// Registering an unchanged token again must be harmless server-side.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushTokenBackend: Send + Sync {
    async fn register(&self, token: &PushToken) -> Result<(), RegistrationError>;

    async fn unregister(&self, token: &PushToken) -> Result<(), RegistrationError>;
}

/// Opaque credential capability owned by the auth collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self) -> Option<String>;

    async fn sign_out(&self);
}

/// Fetches query results from the REST backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShipmentFetcher: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<serde_json::Value, ApiError>;
}
