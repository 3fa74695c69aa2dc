//! Proximity estimation.
//!
//! Pure great-circle math plus the per-shipment cool-down bookkeeping used by
//! the proximity alert policy.

use std::{collections::HashMap, time::Duration};

use super::value_object::{Coordinates, ShipmentId, Timestamp};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Assumed driver speed for proximity alerts.
pub const DEFAULT_PROXIMITY_SPEED_KMH: f64 = 30.0;

/// Assumed driver speed for general route ETA.
pub const DEFAULT_ROUTE_SPEED_KMH: f64 = 40.0;

/// Distance at which a proximity alert becomes due.
pub const DEFAULT_PROXIMITY_THRESHOLD_KM: f64 = 1.0;

/// Minimum time between two alerts for the same shipment.
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

/// Great-circle (haversine) distance in kilometres.
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let d_lat = (b.latitude() - a.latitude()).to_radians();
    let d_lng = (b.longitude() - a.longitude()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // clamp guards asin against rounding just above 1.0 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Travel time in whole minutes at `speed_kmh`, rounded to nearest.
///
/// A non-positive speed yields `None`.
pub fn estimated_minutes(distance_km: f64, speed_kmh: f64) -> Option<i64> {
    if speed_kmh <= 0.0 || !speed_kmh.is_finite() {
        return None;
    }
    Some((distance_km / speed_kmh * 60.0).round() as i64)
}

/// Inclusive threshold check.
pub fn is_within_threshold(distance_km: f64, threshold_km: f64) -> bool {
    distance_km <= threshold_km
}

/// Settings for the proximity alert policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityPolicy {
    pub threshold_km: f64,
    pub speed_kmh: f64,
    pub cooldown: Duration,
}

impl Default for ProximityPolicy {
    fn default() -> Self {
        Self {
            threshold_km: DEFAULT_PROXIMITY_THRESHOLD_KM,
            speed_kmh: DEFAULT_PROXIMITY_SPEED_KMH,
            cooldown: DEFAULT_ALERT_COOLDOWN,
        }
    }
}

/// Per-shipment record of the last proximity alert.
#[derive(Debug, Clone, Default)]
pub struct ProximityAlertState {
    last_alerted_at: HashMap<ShipmentId, Timestamp>,
}

impl ProximityAlertState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_alerted_at(&self, shipment_id: &ShipmentId) -> Option<Timestamp> {
        self.last_alerted_at.get(shipment_id).copied()
    }

    /// Whether the cool-down for `shipment_id` has elapsed at `now`.
    pub fn cooldown_elapsed(
        &self,
        shipment_id: &ShipmentId,
        now: Timestamp,
        cooldown: Duration,
    ) -> bool {
        match self.last_alerted_at.get(shipment_id) {
            None => true,
            Some(last) => now.elapsed_since(*last) >= cooldown,
        }
    }

    pub fn record_alert(&mut self, shipment_id: ShipmentId, now: Timestamp) {
        self.last_alerted_at.insert(shipment_id, now);
    }

    pub fn forget(&mut self, shipment_id: &ShipmentId) {
        self.last_alerted_at.remove(shipment_id);
    }
}
