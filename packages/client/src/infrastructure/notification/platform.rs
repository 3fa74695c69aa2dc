//! Push platform driven by configuration.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::domain::{PermissionStatus, PushPlatform, PushToken, RegistrationError};

/// Push platform whose permission answer and device token come from
/// configuration instead of an OS prompt.
pub struct ConfiguredPushPlatform {
    permission: PermissionStatus,
    device_token: Option<String>,
    prompts: AtomicU32,
}

impl ConfiguredPushPlatform {
    /// `device_token` of `None` models a build without push credentials.
    pub fn new(permission: PermissionStatus, device_token: Option<String>) -> Self {
        Self {
            permission,
            device_token,
            prompts: AtomicU32::new(0),
        }
    }

    /// How many times the permission prompt was shown.
    pub fn prompts(&self) -> u32 {
        self.prompts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PushPlatform for ConfiguredPushPlatform {
    async fn request_permission(&self) -> PermissionStatus {
        self.prompts.fetch_add(1, Ordering::Relaxed);
        self.permission
    }

    async fn device_token(&self) -> Result<PushToken, RegistrationError> {
        let raw = self.device_token.clone().ok_or_else(|| {
            RegistrationError::TokenUnavailable("no push project configured".to_string())
        })?;
        PushToken::new(raw).map_err(|e| RegistrationError::TokenUnavailable(e.to_string()))
    }
}
