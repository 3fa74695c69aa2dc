//! UseCase: 経路の距離と到着予定時刻

use crate::domain::{Coordinates, proximity::{distance_km, estimated_minutes}};

/// 経路全体の距離と所要時間
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub minutes: i64,
}

/// Single leg from `from` to `to` at `speed_kmh`.
pub fn estimate_leg(from: Coordinates, to: Coordinates, speed_kmh: f64) -> Option<RouteEstimate> {
    estimate_route(&[from, to], speed_kmh)
}

/// Sum of great-circle legs between consecutive points.
///
/// An empty or single-point route is zero distance. Returns `None` for a
/// non-positive speed.
pub fn estimate_route(points: &[Coordinates], speed_kmh: f64) -> Option<RouteEstimate> {
    let distance_km: f64 = points
        .windows(2)
        .map(|leg| distance_km(leg[0], leg[1]))
        .sum();
    let minutes = estimated_minutes(distance_km, speed_kmh)?;
    Some(RouteEstimate {
        distance_km,
        minutes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::proximity::DEFAULT_ROUTE_SPEED_KMH;

    fn point(lat: f64, lng: f64) -> Coordinates {
        Coordinates::new(lat, lng).unwrap()
    }

    #[test]
    fn test_route_sums_legs() {
        // テスト項目: 経路の距離は各区間の合計
        // given (前提条件):
        let route = [point(0.0, 0.0), point(0.0, 0.5), point(0.0, 1.0)];

        // when (操作):
        let estimate = estimate_route(&route, DEFAULT_ROUTE_SPEED_KMH).unwrap();

        // then (期待する結果):
        assert!((estimate.distance_km - 111.19).abs() < 0.01);
        assert_eq!(estimate.minutes, 167);
    }

    #[test]
    fn test_short_routes_are_zero() {
        // テスト項目: 点が 1 つ以下の経路は距離 0
        assert_eq!(
            estimate_route(&[], 40.0),
            Some(RouteEstimate {
                distance_km: 0.0,
                minutes: 0
            })
        );
        assert_eq!(estimate_route(&[point(1.0, 1.0)], 40.0).unwrap().minutes, 0);
    }

    #[test]
    fn test_zero_speed_has_no_estimate() {
        // テスト項目: 速度 0 では ETA を出さない
        assert!(estimate_leg(point(0.0, 0.0), point(0.0, 1.0), 0.0).is_none());
    }
}
