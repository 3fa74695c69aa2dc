//! Cache keys for query results.

use std::{fmt, str::FromStr};

use super::{
    error::ValueObjectError,
    value_object::{DriverId, ShipmentId},
};

/// Identifier of a cached query result, partitioned by entity type and id.
///
/// Rendered as `shipments:all`, `shipments:detail:<id>`,
/// `shipments:route:<id>` and `driver:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    ShipmentsAll,
    ShipmentDetail(ShipmentId),
    ShipmentRoute(ShipmentId),
    Driver(DriverId),
}

impl CacheKey {
    /// REST path that backs this key, if the key is refetchable.
    ///
    /// Driver positions only arrive through the live channel.
    pub fn endpoint(&self) -> Option<String> {
        match self {
            Self::ShipmentsAll => Some("/api/users/me/shipments".to_string()),
            Self::ShipmentDetail(id) => Some(format!("/api/users/me/shipments/{id}")),
            Self::ShipmentRoute(id) => Some(format!("/api/users/me/shipments/{id}/history")),
            Self::Driver(_) => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShipmentsAll => write!(f, "shipments:all"),
            Self::ShipmentDetail(id) => write!(f, "shipments:detail:{id}"),
            Self::ShipmentRoute(id) => write!(f, "shipments:route:{id}"),
            Self::Driver(id) => write!(f, "driver:{id}"),
        }
    }
}

impl FromStr for CacheKey {
    type Err = ValueObjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ValueObjectError::UnknownCacheKey(s.to_string());
        match s.split_once(':') {
            Some(("shipments", "all")) => Ok(Self::ShipmentsAll),
            Some(("shipments", rest)) => match rest.split_once(':') {
                Some(("detail", id)) => Ok(Self::ShipmentDetail(ShipmentId::try_from(id)?)),
                Some(("route", id)) => Ok(Self::ShipmentRoute(ShipmentId::try_from(id)?)),
                _ => Err(unknown()),
            },
            Some(("driver", id)) => Ok(Self::Driver(DriverId::try_from(id)?)),
            _ => Err(unknown()),
        }
    }
}
