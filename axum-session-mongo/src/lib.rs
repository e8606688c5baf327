//! Cookie sessions for axum, persisted in a MongoDB collection.
//!
//! The cookie is named `session` unless configured otherwise. Records are
//! keyed by `"{cookie_name}_{identity}"`, so applications sharing one
//! collection need distinct cookie names, and sessions written under
//! another name (for example `AIOHTTP_SESSION`) are only found when the
//! same name is configured with [`SessionStorageBuilder::cookie_name`].
//!
//! A [`SessionStorage`] is configured once, installed as a layer and read in
//! handlers through the [`SessionHandle`] extractor:
//!
//! ```no_run
//! use axum::{Router, routing::get};
//! use axum_session_mongo::{MongoCollection, SessionHandle, SessionStorage};
//!
//! async fn counter(session: SessionHandle) -> String {
//!     let mut session = session.lock().await;
//!     let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
//!     session.insert("visits", visits);
//!     format!("visit {visits}")
//! }
//!
//! # async fn run(db: mongodb::Database) {
//! let storage = SessionStorage::builder()
//!     .collection(MongoCollection::from_database(&db, "sessions"))
//!     .build();
//!
//! let router: Router = Router::new().route("/", get(counter)).layer(storage);
//! # }
//! ```

pub mod storage;

pub(crate) mod utils;

#[cfg(feature = "mongodb")]
pub use storage::MongoCollection;
pub use storage::{
    Codec, MemCollection, SaveError, Session, SessionCollection, SessionHandle, SessionStorage,
    SessionStorageBuilder, StorageConfig,
};
