//! InMemory query cache
//!
//! `QueryCache` trait の HashMap 実装。無効化はエントリを stale にするだけで、
//! 削除はしません（次の参照時に再取得されます）。キーごとに無効化の回数を
//! 数え、取得中に無効化されたキーの結果は stale のまま保存します。

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::domain::{CacheKey, CachedQuery, QueryCache, Timestamp};

#[derive(Debug, Default)]
struct CacheTable {
    entries: HashMap<CacheKey, CachedQuery>,
    revisions: HashMap<CacheKey, u64>,
}

/// インメモリ Query Cache 実装
#[derive(Default)]
pub struct InMemoryQueryCache {
    table: Mutex<CacheTable>,
}

impl InMemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, CacheTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keys currently held, fresh or stale.
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.table().entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl QueryCache for InMemoryQueryCache {
    fn invalidate(&self, key: &CacheKey) -> bool {
        let mut table = self.table();
        *table.revisions.entry(key.clone()).or_default() += 1;
        match table.entries.get_mut(key) {
            Some(entry) if !entry.stale => {
                entry.stale = true;
                true
            }
            _ => false,
        }
    }

    fn get(&self, key: &CacheKey) -> Option<CachedQuery> {
        self.table().entries.get(key).cloned()
    }

    fn put(&self, key: CacheKey, value: serde_json::Value, fetched_at: Timestamp) {
        self.table().entries.insert(
            key,
            CachedQuery {
                value,
                fetched_at,
                stale: false,
            },
        );
    }

    fn revision(&self, key: &CacheKey) -> u64 {
        self.table().revisions.get(key).copied().unwrap_or(0)
    }

    fn put_fetched(
        &self,
        key: CacheKey,
        value: serde_json::Value,
        fetched_at: Timestamp,
        revision: u64,
    ) -> bool {
        let mut table = self.table();
        let fresh = table.revisions.get(&key).copied().unwrap_or(0) == revision;
        table.entries.insert(
            key,
            CachedQuery {
                value,
                fetched_at,
                stale: !fresh,
            },
        );
        fresh
    }

    fn stale_keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .table()
            .entries
            .iter()
            .filter(|(_, entry)| entry.stale)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}
