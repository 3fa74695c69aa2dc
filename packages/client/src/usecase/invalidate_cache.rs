//! UseCase: キャッシュ無効化
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - CacheInvalidationRouter::route() のイベント → キャッシュキー対応表
//! - InvalidateCacheUseCase による無効化の適用（冪等性）
//!
//! ### なぜこのテストが必要か
//! - 対応表の外側のキーを無効化しないことを保証する
//! - データイベントは必ず 1 つ以上のキーに解決されることを保証する
//!
//! ### どのような状況を想定しているか
//! - 正常系：3 種類のデータイベント、プッシュ通知、フォアグラウンド復帰
//! - エッジケース：ライフサイクルイベント、ID の無いプッシュ通知

use std::{collections::BTreeSet, sync::Arc};

use crate::domain::{
    CacheKey, ChannelEvent, NotificationData, NotificationKind, QueryCache,
};

use super::dispatch::{ChannelEventListener, DispatchContext};

/// イベントから無効化すべきキャッシュキーを決める
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheInvalidationRouter;

impl CacheInvalidationRouter {
    pub fn new() -> Self {
        Self
    }

    /// ライブチャンネルイベント → 無効化キー
    ///
    /// | Event | Keys |
    /// |---|---|
    /// | ShipmentStatusUpdated(id) | `shipments:all`, `shipments:detail:<id>`, `shipments:route:<id>` |
    /// | ShipmentLocationUpdated(id) | `shipments:detail:<id>`, `shipments:route:<id>` |
    /// | DriverLocationUpdated(driver) | `driver:<driver>` |
    ///
    /// Lifecycle events resolve to an empty set.
    pub fn route(&self, event: &ChannelEvent) -> BTreeSet<CacheKey> {
        match event {
            ChannelEvent::ShipmentStatusUpdated(change) => BTreeSet::from([
                CacheKey::ShipmentsAll,
                CacheKey::ShipmentDetail(change.shipment_id.clone()),
                CacheKey::ShipmentRoute(change.shipment_id.clone()),
            ]),
            ChannelEvent::ShipmentLocationUpdated(location) => BTreeSet::from([
                CacheKey::ShipmentDetail(location.shipment_id.clone()),
                CacheKey::ShipmentRoute(location.shipment_id.clone()),
            ]),
            ChannelEvent::DriverLocationUpdated(location) => {
                BTreeSet::from([CacheKey::Driver(location.driver_id.clone())])
            }
            ChannelEvent::Connected { .. }
            | ChannelEvent::Disconnected { .. }
            | ChannelEvent::TransportError { .. } => {
                tracing::debug!(event = event.name(), "No cache keys for lifecycle event");
                BTreeSet::new()
            }
        }
    }

    /// プッシュ通知 → 無効化キー
    ///
    /// A shipment push without an id falls back to `shipments:all`.
    pub fn route_push(&self, data: &NotificationData) -> BTreeSet<CacheKey> {
        match (data.kind, &data.shipment_id) {
            (NotificationKind::ShipmentStatus, Some(id)) => BTreeSet::from([
                CacheKey::ShipmentsAll,
                CacheKey::ShipmentDetail(id.clone()),
                CacheKey::ShipmentRoute(id.clone()),
            ]),
            (NotificationKind::DriverProximity, Some(id)) => BTreeSet::from([
                CacheKey::ShipmentDetail(id.clone()),
                CacheKey::ShipmentRoute(id.clone()),
            ]),
            (NotificationKind::ShipmentStatus | NotificationKind::DriverProximity, None) => {
                BTreeSet::from([CacheKey::ShipmentsAll])
            }
            (NotificationKind::DailyReminder | NotificationKind::Test, _) => {
                tracing::debug!(kind = ?data.kind, "Push carries no shipment data");
                BTreeSet::new()
            }
        }
    }

    /// フォアグラウンド復帰時は一覧を無条件に無効化する（バックグラウンド中の取りこぼし対策）
    pub fn foreground_regain(&self) -> BTreeSet<CacheKey> {
        BTreeSet::from([CacheKey::ShipmentsAll])
    }
}

/// キャッシュ無効化のユースケース
#[derive(Clone)]
pub struct InvalidateCacheUseCase {
    cache: Arc<dyn QueryCache>,
    router: CacheInvalidationRouter,
}

impl InvalidateCacheUseCase {
    /// 新しい InvalidateCacheUseCase を作成
    pub fn new(cache: Arc<dyn QueryCache>) -> Self {
        Self {
            cache,
            router: CacheInvalidationRouter::new(),
        }
    }

    pub fn router(&self) -> CacheInvalidationRouter {
        self.router
    }

    /// キーを無効化し、実際に stale になった件数を返す
    pub fn apply(&self, keys: &BTreeSet<CacheKey>) -> usize {
        let changed = keys.iter().filter(|key| self.cache.invalidate(key)).count();
        if !keys.is_empty() {
            let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
            tracing::debug!(keys = ?rendered, changed, "Invalidated cache keys");
        }
        changed
    }

    pub fn on_channel_event(&self, event: &ChannelEvent) -> usize {
        self.apply(&self.router.route(event))
    }

    pub fn on_push(&self, data: &NotificationData) -> usize {
        self.apply(&self.router.route_push(data))
    }

    pub fn on_foreground_regain(&self) -> usize {
        tracing::info!("Foreground regained; invalidating shipment list");
        self.apply(&self.router.foreground_regain())
    }
}

impl ChannelEventListener for InvalidateCacheUseCase {
    fn name(&self) -> &'static str {
        "cache-invalidation"
    }

    fn on_event(&mut self, event: &ChannelEvent, _context: &DispatchContext) {
        self.on_channel_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            Coordinates, DriverId, DriverLocation, ShipmentId, ShipmentLocation,
            ShipmentStatusChange, Timestamp,
        },
        infrastructure::cache::InMemoryQueryCache,
    };

    fn shipment(id: &str) -> ShipmentId {
        ShipmentId::try_from(id).unwrap()
    }

    fn status_updated(id: &str) -> ChannelEvent {
        ChannelEvent::ShipmentStatusUpdated(ShipmentStatusChange {
            shipment_id: shipment(id),
            status: "in_transit".to_string(),
            shipment: None,
            timestamp: Timestamp::new(0),
        })
    }

    fn shipment_location(id: &str) -> ChannelEvent {
        ChannelEvent::ShipmentLocationUpdated(ShipmentLocation {
            shipment_id: shipment(id),
            driver_id: DriverId::try_from("d1").unwrap(),
            position: Coordinates::new(35.0, 139.0).unwrap(),
            accuracy: Some(5.0),
            timestamp: Timestamp::new(0),
        })
    }

    #[test]
    fn test_route_shipment_status_updated() {
        // テスト項目: ShipmentStatusUpdated("42") は一覧・詳細・経路の 3 キーに解決される
        // when (操作):
        let keys = CacheInvalidationRouter::new().route(&status_updated("42"));

        // then (期待する結果):
        let rendered: BTreeSet<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            BTreeSet::from([
                "shipments:all".to_string(),
                "shipments:detail:42".to_string(),
                "shipments:route:42".to_string(),
            ])
        );
    }

    #[test]
    fn test_route_shipment_location_updated() {
        // テスト項目: ShipmentLocationUpdated は一覧を無効化しない
        // when (操作):
        let keys = CacheInvalidationRouter::new().route(&shipment_location("7"));

        // then (期待する結果):
        assert_eq!(
            keys,
            BTreeSet::from([
                CacheKey::ShipmentDetail(shipment("7")),
                CacheKey::ShipmentRoute(shipment("7")),
            ])
        );
    }

    #[test]
    fn test_route_driver_location_updated() {
        // テスト項目: DriverLocationUpdated はドライバーキーのみ
        // given (前提条件):
        let event = ChannelEvent::DriverLocationUpdated(DriverLocation {
            driver_id: DriverId::try_from("d9").unwrap(),
            position: Coordinates::new(0.0, 0.0).unwrap(),
            accuracy: None,
            timestamp: Timestamp::new(0),
        });

        // when (操作):
        let keys = CacheInvalidationRouter::new().route(&event);

        // then (期待する結果):
        assert_eq!(
            keys,
            BTreeSet::from([CacheKey::Driver(DriverId::try_from("d9").unwrap())])
        );
    }

    #[test]
    fn test_route_lifecycle_events_are_ignored() {
        // テスト項目: ライフサイクルイベントはキャッシュに触れない
        // given (前提条件):
        let router = CacheInvalidationRouter::new();

        // then (期待する結果):
        assert!(
            router
                .route(&ChannelEvent::Disconnected {
                    reason: "bye".to_string()
                })
                .is_empty()
        );
        assert!(
            router
                .route(&ChannelEvent::TransportError {
                    message: "x".to_string(),
                    exhausted: true
                })
                .is_empty()
        );
    }

    #[test]
    fn test_route_push_without_id_falls_back_to_list() {
        // テスト項目: ID の無い配送プッシュは最も広いキー（一覧）に解決される
        // given (前提条件):
        let data = NotificationData {
            kind: NotificationKind::ShipmentStatus,
            shipment_id: None,
            status: Some("delivered".to_string()),
        };

        // when (操作):
        let keys = CacheInvalidationRouter::new().route_push(&data);

        // then (期待する結果):
        assert_eq!(keys, BTreeSet::from([CacheKey::ShipmentsAll]));
    }

    #[test]
    fn test_apply_is_idempotent() {
        // テスト項目: 同じイベントを 2 回適用しても 2 回目は何も変わらない
        // given (前提条件):
        let cache = Arc::new(InMemoryQueryCache::new());
        cache.put(CacheKey::ShipmentsAll, serde_json::json!([]), Timestamp::new(0));
        cache.put(
            CacheKey::ShipmentDetail(shipment("42")),
            serde_json::json!({}),
            Timestamp::new(0),
        );
        cache.put(
            CacheKey::ShipmentDetail(shipment("99")),
            serde_json::json!({}),
            Timestamp::new(0),
        );
        let usecase = InvalidateCacheUseCase::new(cache.clone());

        // when (操作):
        let first = usecase.on_channel_event(&status_updated("42"));
        let second = usecase.on_channel_event(&status_updated("42"));

        // then (期待する結果):
        assert_eq!(first, 2); // route:42 はキャッシュに無い
        assert_eq!(second, 0);
        assert!(
            !cache
                .get(&CacheKey::ShipmentDetail(shipment("99")))
                .unwrap()
                .stale
        );
    }
}
