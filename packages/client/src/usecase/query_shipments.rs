//! UseCase: 配送情報の取得（キャッシュ優先）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 新鮮なキャッシュはそのまま返し、REST を呼ばないこと
//! - stale / 未取得のキーは REST から再取得してキャッシュを更新すること
//! - REST エンドポイントを持たないキー（ドライバー）は取得できないこと
//! - 取得中に届いた無効化が取得結果で上書きされないこと
//!
//! ### なぜこのテストが必要か
//! - 無効化されたキーだけが再取得の対象になることを保証する
//!
//! ### どのような状況を想定しているか
//! - 正常系：キャッシュヒット、stale からの再取得、一括リフレッシュ
//! - 異常系：取得失敗時にキャッシュが変更されないこと

use std::sync::Arc;

use serde_json::Value;

use crate::domain::{CacheKey, QueryCache, ShipmentFetcher, ShipmentId, Timestamp};

use super::error::QueryError;

/// 配送クエリのユースケース
#[derive(Clone)]
pub struct ShipmentQueries {
    cache: Arc<dyn QueryCache>,
    fetcher: Arc<dyn ShipmentFetcher>,
}

impl ShipmentQueries {
    /// 新しい ShipmentQueries を作成
    pub fn new(cache: Arc<dyn QueryCache>, fetcher: Arc<dyn ShipmentFetcher>) -> Self {
        Self { cache, fetcher }
    }

    /// Serve `key` from cache while fresh, otherwise fetch and store it.
    ///
    /// # Errors
    ///
    /// `QueryError::NotFetchable` for keys without a REST endpoint, or the
    /// backend error when the fetch fails.
    pub async fn get(&self, key: &CacheKey) -> Result<Value, QueryError> {
        if let Some(cached) = self.cache.get(key)
            && !cached.stale
        {
            tracing::debug!(%key, "Cache hit");
            return Ok(cached.value);
        }
        self.fetch(key).await
    }

    async fn fetch(&self, key: &CacheKey) -> Result<Value, QueryError> {
        let path = key
            .endpoint()
            .ok_or_else(|| QueryError::NotFetchable(key.to_string()))?;
        let revision = self.cache.revision(key);
        tracing::debug!(%key, path, "Fetching query");
        let value = self.fetcher.fetch(&path).await?;
        if !self
            .cache
            .put_fetched(key.clone(), value.clone(), Timestamp::now(), revision)
        {
            tracing::debug!(%key, "Invalidated while fetching; result kept stale");
        }
        Ok(value)
    }

    pub async fn shipments(&self) -> Result<Value, QueryError> {
        self.get(&CacheKey::ShipmentsAll).await
    }

    pub async fn shipment(&self, id: &ShipmentId) -> Result<Value, QueryError> {
        self.get(&CacheKey::ShipmentDetail(id.clone())).await
    }

    pub async fn shipment_history(&self, id: &ShipmentId) -> Result<Value, QueryError> {
        self.get(&CacheKey::ShipmentRoute(id.clone())).await
    }

    /// Refetch every stale key that has a REST endpoint.
    ///
    /// Failures are logged and skipped. Returns the number of keys refreshed.
    pub async fn refresh_stale(&self) -> usize {
        let mut refreshed = 0;
        for key in self.cache.stale_keys() {
            if key.endpoint().is_none() {
                continue;
            }
            match self.fetch(&key).await {
                Ok(_) => refreshed += 1,
                Err(error) => tracing::warn!(%key, %error, "Failed to refresh stale query"),
            }
        }
        refreshed
    }
}
