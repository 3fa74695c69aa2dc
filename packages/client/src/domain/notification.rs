//! Local notification payloads.

use serde::{Deserialize, Serialize};

use super::value_object::ShipmentId;

/// Kind of local notification, consumed by the deep-link handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    ShipmentStatus,
    DriverProximity,
    DailyReminder,
    Test,
}

/// Data attached to a notification (`data` field of the payload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<ShipmentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A notification scheduled on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNotification {
    pub title: String,
    pub body: String,
    pub data: NotificationData,
}

impl LocalNotification {
    /// Alert that the driver of `shipment_id` is `minutes` away.
    pub fn driver_proximity(shipment_id: ShipmentId, distance_km: f64, minutes: i64) -> Self {
        Self {
            title: "Your driver is nearby".to_string(),
            body: format!(
                "Your driver is {distance_km:.1} km away (about {minutes} min)."
            ),
            data: NotificationData {
                kind: NotificationKind::DriverProximity,
                shipment_id: Some(shipment_id),
                status: None,
            },
        }
    }

    /// Shipment status changed.
    pub fn shipment_status(shipment_id: ShipmentId, status: &str) -> Self {
        Self {
            title: "Shipment update".to_string(),
            body: format!("Shipment {shipment_id} is now {status}."),
            data: NotificationData {
                kind: NotificationKind::ShipmentStatus,
                shipment_id: Some(shipment_id),
                status: Some(status.to_string()),
            },
        }
    }

    /// Test notification requested by the user.
    pub fn test() -> Self {
        Self {
            title: "Test notification".to_string(),
            body: "Notifications are working.".to_string(),
            data: NotificationData {
                kind: NotificationKind::Test,
                shipment_id: None,
                status: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_data_wire_format() {
        // テスト項目: data は type / shipmentId / status のキーでシリアライズされる
        // given (前提条件):
        let notification =
            LocalNotification::shipment_status(ShipmentId::try_from("42").unwrap(), "delivered");

        // when (操作):
        let json = serde_json::to_value(&notification.data).unwrap();

        // then (期待する結果):
        assert_eq!(
            json,
            serde_json::json!({
                "type": "shipment-status",
                "shipmentId": "42",
                "status": "delivered"
            })
        );
    }

    #[test]
    fn test_notification_data_parse_push_payload() {
        // テスト項目: プッシュ通知の data を解析できる（status は省略可能）
        // when (操作):
        let data: NotificationData =
            serde_json::from_str(r#"{"type":"driver-proximity","shipmentId":"s1"}"#).unwrap();

        // then (期待する結果):
        assert_eq!(data.kind, NotificationKind::DriverProximity);
        assert_eq!(data.shipment_id.unwrap().as_str(), "s1");
        assert!(data.status.is_none());
    }
}
