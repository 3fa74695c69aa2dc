//! Typed events emitted by the live channel.

use std::fmt;

use super::value_object::{Coordinates, DriverId, ShipmentId, Timestamp};

/// Connection state of the live channel transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Subscription topics understood by the notification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Driver,
    Shipment,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver => write!(f, "driver"),
            Self::Shipment => write!(f, "shipment"),
        }
    }
}

/// A driver position report.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverLocation {
    pub driver_id: DriverId,
    pub position: Coordinates,
    pub accuracy: Option<f64>,
    pub timestamp: Timestamp,
}

/// A driver position report scoped to one shipment.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentLocation {
    pub shipment_id: ShipmentId,
    pub driver_id: DriverId,
    pub position: Coordinates,
    pub accuracy: Option<f64>,
    pub timestamp: Timestamp,
}

/// A shipment status transition.
///
/// `shipment` carries the server's full shipment snapshot when present.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentStatusChange {
    pub shipment_id: ShipmentId,
    pub status: String,
    pub shipment: Option<serde_json::Value>,
    pub timestamp: Timestamp,
}

/// Events produced by the live channel, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected {
        socket_id: String,
        message: String,
        timestamp: Timestamp,
    },
    DriverLocationUpdated(DriverLocation),
    ShipmentLocationUpdated(ShipmentLocation),
    ShipmentStatusUpdated(ShipmentStatusChange),
    Disconnected {
        reason: String,
    },
    /// Transport failure. `exhausted` is set once reconnect attempts ran out.
    TransportError {
        message: String,
        exhausted: bool,
    },
}

impl ChannelEvent {
    /// Short event name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::DriverLocationUpdated(_) => "driver_location_updated",
            Self::ShipmentLocationUpdated(_) => "shipment_location_updated",
            Self::ShipmentStatusUpdated(_) => "shipment_status_updated",
            Self::Disconnected { .. } => "disconnect",
            Self::TransportError { .. } => "error",
        }
    }
}

/// Handle returned by `connect()`, identifying one logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    pub generation: u64,
}

/// Event tagged with the connection generation that produced it.
///
/// Consumers drop envelopes whose generation is no longer current, so no
/// event is handled after the connection that emitted it was torn down.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEnvelope {
    pub generation: u64,
    pub event: ChannelEvent,
}
