//! Real-time synchronization core of the Trackline delivery-tracking client.
//!
//! Keeps the live channel open exactly while the user is signed in and the
//! process is in the foreground, routes live and push updates to cache
//! invalidations, raises proximity alerts and registers the device for push
//! notifications.

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod runner;
pub mod signal;
pub mod ui;
pub mod usecase;

// Re-export entry points
pub use config::SyncConfig;
pub use runner::run_client;
