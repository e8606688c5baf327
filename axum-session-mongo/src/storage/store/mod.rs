mod memory;
#[cfg(feature = "mongodb")]
mod mongo;

pub use memory::MemCollection;
#[cfg(feature = "mongodb")]
pub use mongo::MongoCollection;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::storage::StoredKey;

/// A persisted session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub key: StoredKey,
    /// Encoded payload. `None` when the stored document has no usable data.
    pub data: Option<Value>,
    /// `None` means the record never expires.
    pub expire: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// A record is live until its expiry instant has passed.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.expire {
            Some(expire) => expire >= now,
            None => true,
        }
    }
}

/// The document collection sessions are kept in.
pub trait SessionCollection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether the storage may run a periodic expiry sweep against this
    /// collection.
    fn spawn_sweep_task(&self) -> bool {
        true
    }

    /// Finds the record stored under `key`, unless it expired before `now`.
    fn find_live(
        &self,
        key: &StoredKey,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<SessionRecord>, Self::Error>> + Send;

    /// Inserts the record or replaces `data` and `expire` of the record with
    /// the same key.
    fn upsert(&self, record: SessionRecord) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Deletes every record that expired before `now`, returning how many were removed.
    fn delete_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, Self::Error>> + Send;
}
