//! REPL command parsing.
//!
//! Each line typed at the prompt stands in for an OS or user signal the sync
//! core would receive on a device.

use std::str::FromStr;

use thiserror::Error;

use crate::domain::{
    Coordinates, DriverId, NotificationData, NotificationKind, ProcessVisibility, ShipmentId,
    Topic, UserId, ValueObjectError,
};

/// REPL command parse errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandParseError {
    #[error("Empty input")]
    Empty,

    #[error("Unknown command: {0} (type 'help')")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error(transparent)]
    InvalidValue(#[from] ValueObjectError),
}

/// A parsed REPL command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SignIn { user_id: UserId, token: String },
    SignOut,
    Visibility(ProcessVisibility),
    Push(NotificationData),
    EnablePush,
    Retry,
    Status,
    Subscribe { topic: Topic, id: String },
    Unsubscribe { topic: Topic, id: String },
    Track {
        shipment_id: ShipmentId,
        destination: Coordinates,
        driver_id: Option<DriverId>,
    },
    Untrack(ShipmentId),
    Shipments,
    Shipment(ShipmentId),
    History(ShipmentId),
    Eta(ShipmentId),
    TestNotification,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  signin <user> <token>                 sign in
  signout                               sign out (unregisters push token)
  foreground | background | inactive    change process visibility
  push <shipment-status|driver-proximity|daily-reminder|test> [shipment] [status]
                                        deliver a push notification
  enable-push                           re-enable notifications after a denial
  retry                                 reopen the live channel after it gave up
  status                                show coordinator state
  subscribe <driver|shipment> <id>      subscribe to live updates
  unsubscribe <driver|shipment> <id>    stop live updates
  track <shipment> <lat> <lng> [driver] watch a shipment for proximity alerts
  untrack <shipment>                    stop watching a shipment
  shipments                             list shipments (cached)
  shipment <id>                         show one shipment (cached)
  history <id>                          show a shipment's route history (cached)
  eta <shipment>                        route ETA from the last driver position
  notify-test                           schedule a test notification
  help | quit";

fn parse_topic(raw: &str) -> Result<Topic, CommandParseError> {
    match raw {
        "driver" => Ok(Topic::Driver),
        "shipment" => Ok(Topic::Shipment),
        _ => Err(CommandParseError::Usage("subscribe <driver|shipment> <id>")),
    }
}

fn parse_f64(raw: &str) -> Result<f64, CommandParseError> {
    raw.parse()
        .map_err(|_| CommandParseError::InvalidNumber(raw.to_string()))
}

fn parse_push_kind(raw: &str) -> Result<NotificationKind, CommandParseError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| CommandParseError::Usage("push <kind> [shipment] [status]"))
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return Err(CommandParseError::Empty);
        };

        let command = match (name, args) {
            ("signin", [user, token]) => Command::SignIn {
                user_id: UserId::new(user.to_string())?,
                token: token.to_string(),
            },
            ("signin", _) => return Err(CommandParseError::Usage("signin <user> <token>")),
            ("signout", []) => Command::SignOut,
            ("foreground" | "active", []) => Command::Visibility(ProcessVisibility::Active),
            ("background", []) => Command::Visibility(ProcessVisibility::Background),
            ("inactive", []) => Command::Visibility(ProcessVisibility::Inactive),
            ("push", [kind, rest @ ..]) if rest.len() <= 2 => Command::Push(NotificationData {
                kind: parse_push_kind(kind)?,
                shipment_id: rest
                    .first()
                    .map(|id| ShipmentId::try_from(*id))
                    .transpose()?,
                status: rest.get(1).map(|status| status.to_string()),
            }),
            ("push", _) => return Err(CommandParseError::Usage("push <kind> [shipment] [status]")),
            ("enable-push", []) => Command::EnablePush,
            ("retry", []) => Command::Retry,
            ("status", []) => Command::Status,
            ("subscribe", [topic, id]) => Command::Subscribe {
                topic: parse_topic(topic)?,
                id: id.to_string(),
            },
            ("unsubscribe", [topic, id]) => Command::Unsubscribe {
                topic: parse_topic(topic)?,
                id: id.to_string(),
            },
            ("subscribe" | "unsubscribe", _) => {
                return Err(CommandParseError::Usage("subscribe <driver|shipment> <id>"));
            }
            ("track", [shipment, lat, lng, driver @ ..]) if driver.len() <= 1 => Command::Track {
                shipment_id: ShipmentId::try_from(*shipment)?,
                destination: Coordinates::new(parse_f64(lat)?, parse_f64(lng)?)?,
                driver_id: driver
                    .first()
                    .map(|id| DriverId::try_from(*id))
                    .transpose()?,
            },
            ("track", _) => return Err(CommandParseError::Usage("track <shipment> <lat> <lng> [driver]")),
            ("untrack", [shipment]) => Command::Untrack(ShipmentId::try_from(*shipment)?),
            ("shipments", []) => Command::Shipments,
            ("shipment", [id]) => Command::Shipment(ShipmentId::try_from(*id)?),
            ("history", [id]) => Command::History(ShipmentId::try_from(*id)?),
            ("eta", [id]) => Command::Eta(ShipmentId::try_from(*id)?),
            ("notify-test", []) => Command::TestNotification,
            ("help" | "?", []) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            (other, _) => return Err(CommandParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signin() {
        // テスト項目: signin コマンドを解析できる
        // when (操作):
        let command: Command = "signin alice jwt-123".parse().unwrap();

        // then (期待する結果):
        assert_eq!(
            command,
            Command::SignIn {
                user_id: UserId::new("alice".to_string()).unwrap(),
                token: "jwt-123".to_string()
            }
        );
    }

    #[test]
    fn test_parse_push_with_optional_fields() {
        // テスト項目: push の shipment / status は省略可能
        // when (操作):
        let full: Command = "push shipment-status 42 delivered".parse().unwrap();
        let bare: Command = "push shipment-status".parse().unwrap();

        // then (期待する結果):
        assert_eq!(
            full,
            Command::Push(NotificationData {
                kind: NotificationKind::ShipmentStatus,
                shipment_id: Some(ShipmentId::try_from("42").unwrap()),
                status: Some("delivered".to_string()),
            })
        );
        assert_eq!(
            bare,
            Command::Push(NotificationData {
                kind: NotificationKind::ShipmentStatus,
                shipment_id: None,
                status: None,
            })
        );
    }

    #[test]
    fn test_parse_track_validates_coordinates() {
        // テスト項目: track は座標を検証する
        // when (操作):
        let ok: Command = "track s1 35.68 139.76 d1".parse().unwrap();
        let bad = "track s1 95 139.76".parse::<Command>();
        let nan = "track s1 north 139.76".parse::<Command>();

        // then (期待する結果):
        assert!(matches!(ok, Command::Track { driver_id: Some(_), .. }));
        assert_eq!(
            bad.unwrap_err(),
            CommandParseError::InvalidValue(ValueObjectError::LatitudeOutOfRange(95.0))
        );
        assert_eq!(
            nan.unwrap_err(),
            CommandParseError::InvalidNumber("north".to_string())
        );
    }

    #[test]
    fn test_parse_errors() {
        // テスト項目: 不正な入力はエラーになる
        assert_eq!("".parse::<Command>().unwrap_err(), CommandParseError::Empty);
        assert_eq!(
            "dance".parse::<Command>().unwrap_err(),
            CommandParseError::Unknown("dance".to_string())
        );
        assert!(matches!(
            "subscribe planet 1".parse::<Command>(),
            Err(CommandParseError::Usage(_))
        ));
        assert!(matches!(
            "push party".parse::<Command>(),
            Err(CommandParseError::Usage(_))
        ));
    }

    #[test]
    fn test_parse_shipment_queries() {
        // テスト項目: shipment / history は配送 ID を 1 つ取る
        // when (操作):
        let history: Command = "history 42".parse().unwrap();
        let missing = "history".parse::<Command>();

        // then (期待する結果):
        assert_eq!(
            history,
            Command::History(ShipmentId::try_from("42").unwrap())
        );
        assert_eq!(
            missing.unwrap_err(),
            CommandParseError::Unknown("history".to_string())
        );
    }

    #[test]
    fn test_parse_visibility_aliases() {
        // テスト項目: foreground と active は同じ意味
        assert_eq!(
            "active".parse::<Command>().unwrap(),
            "foreground".parse::<Command>().unwrap()
        );
    }
}
