//! WebSocket message DTOs for the live channel.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use trackline_shared::time::rfc3339_to_timestamp;

use crate::domain::{
    ChannelError, ChannelEvent, Coordinates, DriverId, DriverLocation, ShipmentId,
    ShipmentLocation, ShipmentStatusChange, Timestamp, Topic,
};

/// Inbound envelope before the payload is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Timestamps arrive either as epoch milliseconds or as ISO 8601 strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Iso(String),
}

impl WireTimestamp {
    fn resolve(&self) -> Option<Timestamp> {
        match self {
            Self::Millis(value) => Some(Timestamp::new(*value)),
            Self::Iso(value) => rfc3339_to_timestamp(value).map(Timestamp::new),
        }
    }
}

/// `connected` payload sent by the server after the handshake
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    #[serde(default)]
    pub message: String,
    pub socket_id: String,
    pub timestamp: Option<WireTimestamp>,
}

/// `driver_location_updated` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocationPayload {
    pub driver_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub timestamp: Option<WireTimestamp>,
}

/// `shipment_location_updated` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentLocationPayload {
    pub shipment_id: String,
    pub driver_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub timestamp: Option<WireTimestamp>,
}

/// `shipment_status_updated` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentStatusPayload {
    pub shipment_id: String,
    pub status: String,
    pub shipment: Option<serde_json::Value>,
    pub timestamp: Option<WireTimestamp>,
}

/// Outbound subscription message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub event: String,
    pub data: String,
}

impl OutboundMessage {
    /// `subscribe:driver` / `subscribe:shipment`
    pub fn subscribe(topic: Topic, id: &str) -> Self {
        Self {
            event: format!("subscribe:{topic}"),
            data: id.to_string(),
        }
    }

    /// `unsubscribe:driver` / `unsubscribe:shipment`
    pub fn unsubscribe(topic: Topic, id: &str) -> Self {
        Self {
            event: format!("unsubscribe:{topic}"),
            data: id.to_string(),
        }
    }
}

fn invalid(event: &str, detail: impl std::fmt::Display) -> ChannelError {
    ChannelError::InvalidEvent(format!("{event}: {detail}"))
}

fn payload<T: for<'de> Deserialize<'de>>(
    envelope: &InboundEnvelope,
) -> Result<T, ChannelError> {
    serde_json::from_value(envelope.data.clone()).map_err(|e| invalid(&envelope.event, e))
}

fn timestamp_or(wire: Option<&WireTimestamp>, received_at: Timestamp) -> Timestamp {
    wire.and_then(WireTimestamp::resolve).unwrap_or(received_at)
}

/// Decode one text frame into a typed event.
///
/// Missing or unparsable timestamps fall back to `received_at`.
///
/// # Errors
///
/// Returns `ChannelError::InvalidEvent` for malformed JSON, unknown event
/// names and payloads that fail validation.
pub fn decode_event(text: &str, received_at: Timestamp) -> Result<ChannelEvent, ChannelError> {
    let envelope: InboundEnvelope =
        serde_json::from_str(text).map_err(|e| ChannelError::InvalidEvent(e.to_string()))?;
    let name = envelope.event.as_str();

    match name {
        "connected" => {
            let p: ConnectedPayload = payload(&envelope)?;
            Ok(ChannelEvent::Connected {
                socket_id: p.socket_id,
                message: p.message,
                timestamp: timestamp_or(p.timestamp.as_ref(), received_at),
            })
        }
        "driver_location_updated" => {
            let p: DriverLocationPayload = payload(&envelope)?;
            Ok(ChannelEvent::DriverLocationUpdated(DriverLocation {
                driver_id: DriverId::new(p.driver_id).map_err(|e| invalid(name, e))?,
                position: Coordinates::new(p.latitude, p.longitude)
                    .map_err(|e| invalid(name, e))?,
                accuracy: p.accuracy,
                timestamp: timestamp_or(p.timestamp.as_ref(), received_at),
            }))
        }
        "shipment_location_updated" => {
            let p: ShipmentLocationPayload = payload(&envelope)?;
            Ok(ChannelEvent::ShipmentLocationUpdated(ShipmentLocation {
                shipment_id: ShipmentId::new(p.shipment_id).map_err(|e| invalid(name, e))?,
                driver_id: DriverId::new(p.driver_id).map_err(|e| invalid(name, e))?,
                position: Coordinates::new(p.latitude, p.longitude)
                    .map_err(|e| invalid(name, e))?,
                accuracy: p.accuracy,
                timestamp: timestamp_or(p.timestamp.as_ref(), received_at),
            }))
        }
        "shipment_status_updated" => {
            let p: ShipmentStatusPayload = payload(&envelope)?;
            Ok(ChannelEvent::ShipmentStatusUpdated(ShipmentStatusChange {
                shipment_id: ShipmentId::new(p.shipment_id).map_err(|e| invalid(name, e))?,
                status: p.status,
                shipment: p.shipment,
                timestamp: timestamp_or(p.timestamp.as_ref(), received_at),
            }))
        }
        "disconnect" => Ok(ChannelEvent::Disconnected {
            reason: envelope
                .data
                .as_str()
                .unwrap_or("server disconnect")
                .to_string(),
        }),
        "error" => {
            let message = envelope
                .data
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| envelope.data.as_str())
                .unwrap_or("unknown server error")
                .to_string();
            Ok(ChannelEvent::TransportError {
                message,
                exhausted: false,
            })
        }
        other => Err(ChannelError::InvalidEvent(format!("unknown event '{other}'"))),
    }
}
