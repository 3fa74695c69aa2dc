//! File-backed push token store.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{PushToken, PushTokenStore, RegistrationError, Timestamp};

/// On-disk record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPushToken {
    token: PushToken,
    saved_at: Timestamp,
}

/// Persists the device push token as JSON at `path`.
pub struct FilePushTokenStore {
    path: PathBuf,
}

impl FilePushTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn storage_error(error: impl std::fmt::Display) -> RegistrationError {
    RegistrationError::Storage(error.to_string())
}

#[async_trait]
impl PushTokenStore for FilePushTokenStore {
    async fn load(&self) -> Result<Option<PushToken>, RegistrationError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error(e)),
        };
        let stored: StoredPushToken = serde_json::from_slice(&bytes).map_err(storage_error)?;
        Ok(Some(stored.token))
    }

    async fn save(&self, token: &PushToken) -> Result<(), RegistrationError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(storage_error)?;
        }
        let stored = StoredPushToken {
            token: token.clone(),
            saved_at: Timestamp::now(),
        };
        let json = serde_json::to_vec_pretty(&stored).map_err(storage_error)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(storage_error)
    }

    async fn clear(&self) -> Result<(), RegistrationError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        // テスト項目: 保存したトークンを読み出せる
        // given (前提条件):
        let dir = tempfile::tempdir().unwrap();
        let store = FilePushTokenStore::new(dir.path().join("nested/push-token.json"));
        let token = PushToken::new("ExponentPushToken[xyz]".to_string()).unwrap();

        // when (操作):
        store.save(&token).await.unwrap();
        let loaded = store.load().await.unwrap();

        // then (期待する結果):
        assert_eq!(loaded, Some(token));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_none() {
        // テスト項目: ファイルが無い場合は None
        // given (前提条件):
        let dir = tempfile::tempdir().unwrap();
        let store = FilePushTokenStore::new(dir.path().join("push-token.json"));

        // then (期待する結果):
        assert_eq!(store.load().await.unwrap(), None);
        assert!(store.clear().await.is_ok());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_storage_error() {
        // テスト項目: 壊れたファイルは Storage エラーになる
        // given (前提条件):
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("push-token.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let store = FilePushTokenStore::new(path);

        // when (操作):
        let result = store.load().await;

        // then (期待する結果):
        assert!(matches!(result, Err(RegistrationError::Storage(_))));
    }
}
