use std::{collections::HashMap, convert::Infallible, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::storage::{SessionCollection, SessionRecord, StoredKey};

/// Sessions kept in process memory. Clones share the same map.
///
/// Meant for tests and local development, nothing survives a restart.
#[derive(Default, Clone)]
pub struct MemCollection {
    inner: Arc<RwLock<HashMap<StoredKey, SessionRecord>>>,
}

impl MemCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw record under `key`, expired or not.
    pub async fn get(&self, key: &StoredKey) -> Option<SessionRecord> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl SessionCollection for MemCollection {
    type Error = Infallible;

    async fn find_live(
        &self,
        key: &StoredKey,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, Infallible> {
        let lock = self.inner.read().await;
        Ok(lock.get(key).filter(|record| record.is_live(now)).cloned())
    }

    async fn upsert(&self, record: SessionRecord) -> Result<(), Infallible> {
        let mut lock = self.inner.write().await;
        lock.insert(record.key.clone(), record);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, Infallible> {
        let mut lock = self.inner.write().await;
        let before = lock.len();
        lock.retain(|_, record| record.is_live(now));
        Ok((before - lock.len()) as u64)
    }
}
