use chrono::{DateTime, Utc};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{self, Binary, Bson, Document, doc, spec::BinarySubtype},
    options::IndexOptions,
};
use serde_json::Value;

use crate::storage::{SessionCollection, SessionRecord, StoredKey};

/// Sessions stored in a MongoDB collection.
///
/// Documents have the shape `{ key: Binary, data: <payload>, expire: Date | null }`
/// and are addressed by `key`, never by `_id`.
#[derive(Clone)]
pub struct MongoCollection {
    collection: Collection<Document>,
}

impl MongoCollection {
    pub fn new(collection: Collection<Document>) -> Self {
        Self { collection }
    }

    pub fn from_database(database: &Database, name: &str) -> Self {
        Self::new(database.collection(name))
    }

    /// Creates the unique index on `key` that upserts rely on.
    pub async fn ensure_indexes(&self) -> mongodb::error::Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "key": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.collection.create_index(index).await?;
        Ok(())
    }

    pub fn inner(&self) -> &Collection<Document> {
        &self.collection
    }
}

impl SessionCollection for MongoCollection {
    type Error = mongodb::error::Error;

    async fn find_live(
        &self,
        key: &StoredKey,
        now: DateTime<Utc>,
    ) -> mongodb::error::Result<Option<SessionRecord>> {
        let document = self.collection.find_one(live_filter(key, now)).await?;

        Ok(document.map(|document| record_from_document(key, document)))
    }

    async fn upsert(&self, record: SessionRecord) -> mongodb::error::Result<()> {
        let update = upsert_update(&record)?;

        self.collection
            .update_one(key_filter(&record.key), update)
            .upsert(true)
            .await?;

        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> mongodb::error::Result<u64> {
        let result = self.collection.delete_many(expired_filter(now)).await?;
        Ok(result.deleted_count)
    }
}

fn key_bson(key: &StoredKey) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes: key.as_bytes().to_vec(),
    })
}

fn datetime_bson(at: DateTime<Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(at.timestamp_millis()))
}

fn key_filter(key: &StoredKey) -> Document {
    doc! { "key": key_bson(key) }
}

// `expire: null` also matches documents without the field. `0` is the
// "never expires" marker older writers used.
fn live_filter(key: &StoredKey, now: DateTime<Utc>) -> Document {
    doc! {
        "$and": [
            { "key": key_bson(key) },
            {
                "$or": [
                    { "expire": Bson::Null },
                    { "expire": 0 },
                    { "expire": { "$gte": datetime_bson(now) } },
                ]
            },
        ]
    }
}

fn expired_filter(now: DateTime<Utc>) -> Document {
    doc! { "expire": { "$lt": datetime_bson(now) } }
}

fn upsert_update(record: &SessionRecord) -> Result<Document, bson::ser::Error> {
    let data = match &record.data {
        Some(data) => bson::to_bson(data)?,
        None => Bson::Null,
    };
    let expire = record.expire.map_or(Bson::Null, datetime_bson);

    Ok(doc! {
        "$set": {
            "key": key_bson(&record.key),
            "data": data,
            "expire": expire,
        }
    })
}

fn record_from_document(key: &StoredKey, mut document: Document) -> SessionRecord {
    let data = match document.remove("data") {
        None | Some(Bson::Null) => None,
        Some(data) => match bson::from_bson::<Value>(data) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!("stored session data is not representable as json: {e}");
                None
            }
        },
    };

    let expire = match document.get("expire") {
        Some(Bson::DateTime(expire)) => DateTime::from_timestamp_millis(expire.timestamp_millis()),
        _ => None,
    };

    SessionRecord {
        key: key.clone(),
        data,
        expire,
    }
}
