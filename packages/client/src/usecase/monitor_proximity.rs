//! UseCase: ドライバー接近の検知と通知
//!
//! 位置イベントごとに配送先までの距離を計算し、以下をすべて満たすときだけ
//! ローカル通知を 1 件スケジュールします。
//!
//! - 距離がしきい値以内
//! - プロセスが Active ではない
//! - その配送のクールダウンが経過済み

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::domain::{
    ChannelEvent, Coordinates, DriverId, LocalNotification, NotificationScheduler,
    ProcessVisibility, ProximityAlertState, ProximityPolicy, ShipmentId, Timestamp,
    proximity::{distance_km, estimated_minutes, is_within_threshold},
};

use super::{
    dispatch::{ChannelEventListener, DispatchContext},
    route_eta::{RouteEstimate, estimate_leg},
};

/// Statuses after which a shipment is no longer tracked.
const FINAL_STATUSES: [&str; 3] = ["delivered", "cancelled", "failed"];

/// 追跡中の配送
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedShipment {
    pub destination: Coordinates,
    pub driver_id: Option<DriverId>,
    pub last_position: Option<Coordinates>,
}

#[derive(Debug, Default)]
struct ProximityState {
    tracked: HashMap<ShipmentId, TrackedShipment>,
    alerts: ProximityAlertState,
}

/// Result of evaluating one position report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProximityOutcome {
    NotTracked,
    OutOfRange { distance_km: f64 },
    Foreground { distance_km: f64 },
    CoolingDown { distance_km: f64 },
    ScheduleFailed { distance_km: f64 },
    Alerted { distance_km: f64, minutes: i64 },
}

/// 近接検知のユースケース
///
/// Clones share state, so one clone can be registered as a listener while
/// another is used to track shipments.
#[derive(Clone)]
pub struct ProximityMonitor {
    state: Arc<Mutex<ProximityState>>,
    scheduler: Arc<dyn NotificationScheduler>,
    policy: ProximityPolicy,
}

impl ProximityMonitor {
    /// 新しい ProximityMonitor を作成
    pub fn new(scheduler: Arc<dyn NotificationScheduler>, policy: ProximityPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProximityState::default())),
            scheduler,
            policy,
        }
    }

    fn state(&self) -> MutexGuard<'_, ProximityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> ProximityPolicy {
        self.policy
    }

    /// 配送先を登録する（ドライバーが分かっていれば併せて登録）
    pub fn track(
        &self,
        shipment_id: ShipmentId,
        destination: Coordinates,
        driver_id: Option<DriverId>,
    ) {
        tracing::info!(%shipment_id, %destination, "Tracking shipment for proximity alerts");
        self.state().tracked.insert(
            shipment_id,
            TrackedShipment {
                destination,
                driver_id,
                last_position: None,
            },
        );
    }

    pub fn untrack(&self, shipment_id: &ShipmentId) {
        let mut state = self.state();
        state.tracked.remove(shipment_id);
        state.alerts.forget(shipment_id);
    }

    pub fn tracked(&self, shipment_id: &ShipmentId) -> Option<TrackedShipment> {
        self.state().tracked.get(shipment_id).cloned()
    }

    pub fn last_alerted_at(&self, shipment_id: &ShipmentId) -> Option<Timestamp> {
        self.state().alerts.last_alerted_at(shipment_id)
    }

    /// ETA from the last known driver position at route speed.
    pub fn route_eta(&self, shipment_id: &ShipmentId, speed_kmh: f64) -> Option<RouteEstimate> {
        let tracked = self.tracked(shipment_id)?;
        estimate_leg(tracked.last_position?, tracked.destination, speed_kmh)
    }

    /// 1 件の位置情報を評価し、条件を満たせば通知する
    pub fn evaluate(
        &self,
        shipment_id: &ShipmentId,
        position: Coordinates,
        visibility: ProcessVisibility,
        now: Timestamp,
    ) -> ProximityOutcome {
        let mut state = self.state();
        let Some(tracked) = state.tracked.get_mut(shipment_id) else {
            return ProximityOutcome::NotTracked;
        };
        tracked.last_position = Some(position);

        let distance_km = distance_km(position, tracked.destination);
        if !is_within_threshold(distance_km, self.policy.threshold_km) {
            return ProximityOutcome::OutOfRange { distance_km };
        }
        if visibility.is_active() {
            return ProximityOutcome::Foreground { distance_km };
        }
        if !state
            .alerts
            .cooldown_elapsed(shipment_id, now, self.policy.cooldown)
        {
            tracing::debug!(%shipment_id, distance_km, "Proximity alert suppressed by cool-down");
            return ProximityOutcome::CoolingDown { distance_km };
        }

        let minutes = estimated_minutes(distance_km, self.policy.speed_kmh).unwrap_or(0);
        let notification =
            LocalNotification::driver_proximity(shipment_id.clone(), distance_km, minutes);
        if let Err(error) = self.scheduler.schedule(notification) {
            tracing::warn!(%shipment_id, %error, "Failed to schedule proximity alert");
            return ProximityOutcome::ScheduleFailed { distance_km };
        }
        state.alerts.record_alert(shipment_id.clone(), now);
        tracing::info!(%shipment_id, distance_km, minutes, "Proximity alert scheduled");
        ProximityOutcome::Alerted {
            distance_km,
            minutes,
        }
    }

    fn shipments_for_driver(&self, driver_id: &DriverId) -> Vec<ShipmentId> {
        self.state()
            .tracked
            .iter()
            .filter(|(_, tracked)| tracked.driver_id.as_ref() == Some(driver_id))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl ChannelEventListener for ProximityMonitor {
    fn name(&self) -> &'static str {
        "proximity"
    }

    fn on_event(&mut self, event: &ChannelEvent, context: &DispatchContext) {
        match event {
            ChannelEvent::DriverLocationUpdated(location) => {
                for shipment_id in self.shipments_for_driver(&location.driver_id) {
                    self.evaluate(
                        &shipment_id,
                        location.position,
                        context.visibility,
                        context.now,
                    );
                }
            }
            ChannelEvent::ShipmentLocationUpdated(location) => {
                if let Some(tracked) = self.state().tracked.get_mut(&location.shipment_id) {
                    tracked.driver_id = Some(location.driver_id.clone());
                }
                self.evaluate(
                    &location.shipment_id,
                    location.position,
                    context.visibility,
                    context.now,
                );
            }
            ChannelEvent::ShipmentStatusUpdated(change)
                if FINAL_STATUSES.contains(&change.status.to_ascii_lowercase().as_str()) =>
            {
                tracing::debug!(shipment_id = %change.shipment_id, status = %change.status, "Shipment finished; stop tracking");
                self.untrack(&change.shipment_id);
            }
            _ => {}
        }
    }
}
