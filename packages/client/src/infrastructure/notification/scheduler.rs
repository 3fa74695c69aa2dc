//! Local notification scheduling.

use std::sync::{Mutex, PoisonError};

use crate::domain::{LocalNotification, NotificationError, NotificationScheduler, Timestamp};

/// Scheduler that records notifications and reports them through tracing.
///
/// Stands in for the device notification center when running on a desktop.
#[derive(Default)]
pub struct TracingNotificationScheduler {
    delivered: Mutex<Vec<LocalNotification>>,
}

impl TracingNotificationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications scheduled so far, oldest first.
    pub fn delivered(&self) -> Vec<LocalNotification> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationScheduler for TracingNotificationScheduler {
    fn schedule(&self, notification: LocalNotification) -> Result<(), NotificationError> {
        let data = serde_json::to_string(&notification.data)
            .map_err(|e| NotificationError(e.to_string()))?;
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            %data,
            scheduled_at = %Timestamp::now().to_rfc3339(),
            "Local notification scheduled"
        );
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        Ok(())
    }
}
