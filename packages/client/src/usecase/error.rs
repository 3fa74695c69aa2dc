//! UseCase 層のエラー定義

use thiserror::Error;

use crate::domain::ApiError;

/// クエリ取得時のエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// REST エンドポイントを持たないキー（ライブチャンネル専用）
    #[error("Cache key {0} has no REST endpoint")]
    NotFetchable(String),

    /// バックエンドからの取得失敗
    #[error(transparent)]
    Api(#[from] ApiError),
}
