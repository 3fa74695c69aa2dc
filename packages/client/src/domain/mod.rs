//! Domain layer for the real-time sync core.
//!
//! This module contains the state and rules that are independent of
//! transports, storage and the UI.

pub mod cache_key;
pub mod error;
pub mod event;
pub mod notification;
pub mod port;
pub mod proximity;
pub mod push_registration;
pub mod session;
pub mod value_object;

pub use cache_key::CacheKey;
pub use error::{
    ApiError, ChannelError, NotificationError, RegistrationError, RegistrationStateError,
    ValueObjectError,
};
pub use event::{
    ChannelConnectionState, ChannelEnvelope, ChannelEvent, ConnectionHandle, DriverLocation,
    ShipmentLocation, ShipmentStatusChange, Topic,
};
pub use notification::{LocalNotification, NotificationData, NotificationKind};
pub use port::{
    CachedQuery, ChannelEndpoint, NotificationScheduler, PermissionStatus, PushPlatform,
    PushTokenBackend, PushTokenStore, QueryCache, RealtimeChannel, ShipmentFetcher,
    TokenProvider,
};
pub use proximity::{ProximityAlertState, ProximityPolicy};
pub use push_registration::{PushRegistration, RegistrationState};
pub use session::{AuthSession, AuthStatus, ProcessVisibility};
pub use value_object::{Coordinates, DriverId, PushToken, ShipmentId, Timestamp, UserId};
