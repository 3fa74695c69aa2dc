//! Command-line and environment configuration.

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{
    domain::{PermissionStatus, ProximityPolicy},
    infrastructure::channel::ReconnectPolicy,
};

/// Real-time sync client for Trackline.
#[derive(Debug, Clone, Parser)]
#[command(name = "trackline-client", version, about, long_about = None)]
pub struct SyncConfig {
    /// REST API base URL
    #[arg(long, env = "TRACKLINE_API_URL", default_value = "http://localhost:3000")]
    pub api_url: String,

    /// Live channel WebSocket URL
    #[arg(
        long,
        env = "TRACKLINE_REALTIME_URL",
        default_value = "ws://localhost:3004/ws"
    )]
    pub realtime_url: String,

    /// Reconnect attempts before the live channel gives up
    #[arg(long, env = "TRACKLINE_RECONNECT_ATTEMPTS", default_value_t = 5)]
    pub reconnect_attempts: u32,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, env = "TRACKLINE_RECONNECT_DELAY_MS", default_value_t = 1000)]
    pub reconnect_delay_ms: u64,

    /// Distance in km at which a proximity alert becomes due
    #[arg(long, env = "TRACKLINE_PROXIMITY_KM", default_value_t = 1.0)]
    pub proximity_threshold_km: f64,

    /// Assumed driver speed for proximity alerts (km/h)
    #[arg(long, env = "TRACKLINE_PROXIMITY_SPEED_KMH", default_value_t = 30.0)]
    pub proximity_speed_kmh: f64,

    /// Assumed driver speed for route ETA (km/h)
    #[arg(long, env = "TRACKLINE_ROUTE_SPEED_KMH", default_value_t = 40.0)]
    pub route_speed_kmh: f64,

    /// Minimum seconds between proximity alerts for one shipment
    #[arg(long, env = "TRACKLINE_PROXIMITY_COOLDOWN_SECS", default_value_t = 900)]
    pub proximity_cooldown_secs: u64,

    /// File holding the device push token
    #[arg(
        long,
        env = "TRACKLINE_PUSH_TOKEN_PATH",
        default_value = ".trackline/push-token.json"
    )]
    pub push_token_path: PathBuf,

    /// Device push token handed out by the platform (unset: no push project)
    #[arg(long, env = "TRACKLINE_DEVICE_PUSH_TOKEN")]
    pub device_push_token: Option<String>,

    /// Answer "deny" to the notification permission prompt
    #[arg(long, env = "TRACKLINE_DENY_NOTIFICATIONS")]
    pub deny_notifications: bool,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "TRACKLINE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl SyncConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.reconnect_attempts,
            Duration::from_millis(self.reconnect_delay_ms),
        )
    }

    pub fn proximity_policy(&self) -> ProximityPolicy {
        ProximityPolicy {
            threshold_km: self.proximity_threshold_km,
            speed_kmh: self.proximity_speed_kmh,
            cooldown: Duration::from_secs(self.proximity_cooldown_secs),
        }
    }

    pub fn permission(&self) -> PermissionStatus {
        if self.deny_notifications {
            PermissionStatus::Denied
        } else {
            PermissionStatus::Granted
        }
    }
}
