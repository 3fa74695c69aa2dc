//! REST client for the order and identity services.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};

use crate::{
    domain::{
        ApiError, PushToken, PushTokenBackend, RegistrationError, ShipmentFetcher, TokenProvider,
    },
    infrastructure::dto::http::PushTokenRequest,
};

const PUSH_TOKEN_PATH: &str = "/api/users/me/push-token";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Bearer-authenticated JSON client for the backend.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    platform: String,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:3000`).
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Transport` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        platform: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            platform: platform.into(),
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&PushTokenRequest>,
    ) -> Result<reqwest::Response, ApiError> {
        let token = self.tokens.get_token().await.ok_or(ApiError::MissingToken)?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.request(method.clone(), &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => {
                tracing::warn!(%method, path, "Backend rejected credentials; signing out");
                self.tokens.sign_out().await;
                Err(ApiError::Unauthorized)
            }
            status => Err(ApiError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            }),
        }
    }

    fn push_token_request(&self, token: &PushToken) -> PushTokenRequest {
        PushTokenRequest {
            push_token: token.as_str().to_string(),
            platform: self.platform.clone(),
        }
    }
}

#[async_trait]
impl ShipmentFetcher for ApiClient {
    async fn fetch(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        let response = self.send(Method::GET, path, None).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))
    }
}

#[async_trait]
impl PushTokenBackend for ApiClient {
    async fn register(&self, token: &PushToken) -> Result<(), RegistrationError> {
        let body = self.push_token_request(token);
        self.send(Method::POST, PUSH_TOKEN_PATH, Some(&body))
            .await
            .map(|_| ())
            .map_err(|e| RegistrationError::BackendUnreachable(e.to_string()))
    }

    async fn unregister(&self, token: &PushToken) -> Result<(), RegistrationError> {
        let body = self.push_token_request(token);
        self.send(Method::DELETE, PUSH_TOKEN_PATH, Some(&body))
            .await
            .map(|_| ())
            .map_err(|e| RegistrationError::BackendUnreachable(e.to_string()))
    }
}
