//! HTTP request DTOs for the REST backend.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/users/me/push-token`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTokenRequest {
    pub push_token: String,
    pub platform: String,
}
