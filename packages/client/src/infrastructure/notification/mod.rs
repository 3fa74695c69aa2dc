//! Device-side notification adapters.

pub mod platform;
pub mod scheduler;

pub use platform::ConfiguredPushPlatform;
pub use scheduler::TracingNotificationScheduler;
