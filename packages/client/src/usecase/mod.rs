//! UseCase layer
//!
//! The lifecycle coordinator drives the channel; the other use cases are
//! listeners or collaborators it is wired with.

pub mod dispatch;
pub mod error;
pub mod invalidate_cache;
pub mod lifecycle;
pub mod monitor_proximity;
pub mod query_shipments;
pub mod register_push;
pub mod route_eta;

pub use dispatch::{ChannelEventListener, DispatchContext, EventDispatcher};
pub use error::QueryError;
pub use invalidate_cache::{CacheInvalidationRouter, InvalidateCacheUseCase};
pub use lifecycle::{CoordinatorStatus, DesiredState, LifecycleCoordinator, LifecycleInput};
pub use monitor_proximity::{ProximityMonitor, ProximityOutcome, TrackedShipment};
pub use query_shipments::ShipmentQueries;
pub use register_push::PushRegistrationManager;
pub use route_eta::{RouteEstimate, estimate_leg, estimate_route};
