mod builder;
mod codec;
mod cookie;
mod error;
mod expiry;
mod id;
mod service;
mod session;
mod store;

use std::sync::Arc;

use axum::http::{HeaderMap, header::SET_COOKIE};
use tokio::{runtime::Handle, task::JoinHandle};

pub use builder::{KeyFactory, SessionStorageBuilder, StorageBuilderError, StorageConfig};
pub use codec::{Codec, CodecError};
pub use cookie::{CookieError, CookieParams};
pub use cookie_monster::{Cookie, CookieBuilder, SameSite};
pub use error::SaveError;
pub use id::{StoredKey, uuid_key};
pub use service::SessionService;
pub use session::{Session, SessionHandle};
#[cfg(feature = "mongodb")]
pub use store::MongoCollection;
pub use store::{MemCollection, SessionCollection, SessionRecord};

use crate::utils::{add_duration, utc_now};

/// Loads and saves [`Session`]s in a [`SessionCollection`].
///
/// Cheap to clone. Used as a tower layer it drives the whole session
/// lifecycle of a request, see [`SessionService`].
pub struct SessionStorage<C>(Arc<SessionStorageInner<C>>);

struct SessionStorageInner<C> {
    collection: Arc<C>,
    config: StorageConfig,
    sweep: Option<JoinHandle<()>>,
}

impl<C> Drop for SessionStorageInner<C> {
    fn drop(&mut self) {
        if let Some(sweep) = &self.sweep {
            sweep.abort();
        }
    }
}

impl SessionStorage<()> {
    pub fn builder() -> SessionStorageBuilder<()> {
        SessionStorageBuilder::new()
    }
}

impl<C: SessionCollection> SessionStorage<C> {
    /// Validates `config` and starts the expiry sweep if one is configured.
    pub fn new(collection: C, config: StorageConfig) -> Result<Self, StorageBuilderError> {
        config.validate()?;

        let collection = Arc::new(collection);

        let mut sweep = None;
        if let Some(every) = config.delete_expired_every
            && collection.spawn_sweep_task()
        {
            let runtime = Handle::try_current().map_err(|_| StorageBuilderError::NoRuntime)?;
            let task = expiry::sweep_task(collection.clone(), every);
            sweep = Some(runtime.spawn(task));
            tracing::debug!(?every, "started expired session sweep");
        }

        Ok(SessionStorage(Arc::new(SessionStorageInner {
            collection,
            config,
            sweep,
        })))
    }

    pub fn config(&self) -> &StorageConfig {
        &self.0.config
    }

    pub fn cookie(&self) -> &CookieParams {
        &self.0.config.cookie
    }

    pub fn collection(&self) -> &C {
        &self.0.collection
    }

    /// The key the session with `identity` is stored under.
    pub fn stored_key(&self, identity: &str) -> StoredKey {
        StoredKey::new(self.0.config.cookie.name(), identity)
    }

    /// Loads the session the request cookie points to.
    ///
    /// Missing cookies and missing or expired records give a new session.
    /// A record that fails to decode gives an empty session that keeps its
    /// identity.
    pub async fn load(&self, headers: &HeaderMap) -> Result<Session, C::Error> {
        let config = &self.0.config;
        let max_age = config.cookie.max_age;

        let Some(identity) = config.cookie.load_cookie(headers) else {
            return Ok(Session::new(max_age));
        };

        let key = self.stored_key(&identity);
        let Some(record) = self.0.collection.find_live(&key, utc_now()).await? else {
            return Ok(Session::new(max_age));
        };

        let payload = match record.data.map(|data| config.codec.decode(data)) {
            Some(Ok(payload)) => Some(payload),
            Some(Err(e)) => {
                tracing::warn!("could not decode stored session, starting empty: {e}");
                None
            }
            None => None,
        };

        Ok(Session::from_payload(identity, payload, max_age))
    }

    /// Upserts the record and writes the session cookie into `headers`.
    ///
    /// A session without identity gets one from the key factory. An empty
    /// session clears the cookie while its record is overwritten with `{}`.
    /// On error neither `headers` nor `session` are touched.
    pub async fn save(
        &self,
        headers: &mut HeaderMap,
        session: &mut Session,
    ) -> Result<(), SaveError<C::Error>> {
        let config = &self.0.config;
        let max_age = session.max_age();

        let data = config
            .codec
            .encode(session.payload())
            .map_err(SaveError::Encode)?;

        let (identity, minted) = match session.identity() {
            Some(identity) => (identity.to_string(), false),
            None => ((config.key_factory)(), true),
        };

        let value = if session.is_empty() && !minted {
            ""
        } else {
            identity.as_str()
        };
        let cookie = config
            .cookie
            .cookie_header(value, max_age)
            .map_err(SaveError::Cookie)?;

        let expire = max_age.and_then(|max_age| add_duration(utc_now(), max_age));

        self.0
            .collection
            .upsert(SessionRecord {
                key: self.stored_key(&identity),
                data: Some(data),
                expire,
            })
            .await
            .map_err(SaveError::Store)?;

        headers.append(SET_COOKIE, cookie);
        if minted {
            session.set_identity(identity);
        }

        Ok(())
    }

    /// Stops the expiry sweep. Loads and saves keep working.
    pub fn finalize(&self) {
        if let Some(sweep) = &self.0.sweep {
            sweep.abort();
            tracing::debug!("stopped expired session sweep");
        }
    }
}

impl<C> Clone for SessionStorage<C> {
    fn clone(&self) -> Self {
        SessionStorage(self.0.clone())
    }
}

#[cfg(test)]
mod storage {
    use std::{io, time::Duration};

    use axum::http::{
        HeaderMap, HeaderValue,
        header::{COOKIE, SET_COOKIE},
    };
    use chrono::{DateTime, TimeDelta, Utc};
    use serde_json::json;

    use crate::storage::{
        Codec, CodecError, MemCollection, SaveError, Session, SessionCollection, SessionRecord,
        SessionStorage, StoredKey,
    };

    fn storage() -> (MemCollection, SessionStorage<MemCollection>) {
        let store = MemCollection::new();
        let storage = SessionStorage::builder().collection(store.clone()).build();
        (store, storage)
    }

    fn with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("session={value}")).unwrap(),
        );
        headers
    }

    fn set_cookie(headers: &HeaderMap) -> &str {
        headers.get(SET_COOKIE).unwrap().to_str().unwrap()
    }

    async fn put(store: &MemCollection, id: &str, data: serde_json::Value) {
        store
            .upsert(SessionRecord {
                key: StoredKey::new("session", id),
                data: Some(data),
                expire: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn no_cookie() {
        let (_, storage) = storage();

        let session = storage.load(&HeaderMap::new()).await.unwrap();

        assert!(session.is_new());
        assert!(session.is_empty());
        assert!(session.identity().is_none());
    }

    #[tokio::test]
    async fn unknown_cookie() {
        let (_, storage) = storage();

        let session = storage.load(&with_cookie("nope")).await.unwrap();

        assert!(session.is_new());
        assert!(session.identity().is_none());
    }

    #[tokio::test]
    async fn load_existing() {
        let (store, storage) = storage();
        put(&store, "abc", json!({"created": 7, "session": {"a": 1, "b": 12}})).await;

        let session = storage.load(&with_cookie("abc")).await.unwrap();

        assert!(!session.is_new());
        assert_eq!(session.identity(), Some("abc"));
        assert_eq!(session.created(), 7);
        assert_eq!(session.get("b"), Some(&json!(12)));
    }

    #[tokio::test]
    async fn key_is_namespaced_by_cookie_name() {
        let (store, storage) = storage();
        store
            .upsert(SessionRecord {
                key: StoredKey::from(b"abc".to_vec()),
                data: Some(json!({"created": 7, "session": {"a": 1}})),
                expire: None,
            })
            .await
            .unwrap();

        let session = storage.load(&with_cookie("abc")).await.unwrap();

        assert!(session.is_new());
    }

    #[tokio::test]
    async fn expired_record_is_absent() {
        let (store, storage) = storage();
        store
            .upsert(SessionRecord {
                key: StoredKey::new("session", "abc"),
                data: Some(json!({"created": 7, "session": {"a": 1}})),
                expire: Some(Utc::now() - TimeDelta::seconds(1)),
            })
            .await
            .unwrap();

        let session = storage.load(&with_cookie("abc")).await.unwrap();

        assert!(session.is_new());
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn undecodable_record() {
        let store = MemCollection::new();
        let storage = SessionStorage::builder()
            .codec(Codec::new(Ok, |_| Err(CodecError::Malformed("nope".into()))))
            .collection(store.clone())
            .build();
        put(&store, "abc", json!({"created": 7, "session": {"a": 1}})).await;

        let session = storage.load(&with_cookie("abc")).await.unwrap();

        assert!(!session.is_new());
        assert!(session.is_empty());
        assert_eq!(session.identity(), Some("abc"));
    }

    #[tokio::test]
    async fn save_new_mints_identity() {
        let store = MemCollection::new();
        let storage = SessionStorage::builder()
            .max_age(Duration::from_secs(8))
            .key_factory(|| "test-key".into())
            .collection(store.clone())
            .build();

        let mut session = storage.load(&HeaderMap::new()).await.unwrap();
        session.insert("a", "b");

        let mut headers = HeaderMap::new();
        storage.save(&mut headers, &mut session).await.unwrap();

        assert_eq!(session.identity(), Some("test-key"));
        assert!(
            set_cookie(&headers).starts_with("session=test-key; Max-Age=8; Path=/; HttpOnly; Expires=")
        );

        let record = store.get(&StoredKey::new("session", "test-key")).await.unwrap();
        assert!(record.expire.unwrap() > Utc::now());

        let loaded = storage.load(&with_cookie("test-key")).await.unwrap();
        assert_eq!(loaded.get("a"), Some(&json!("b")));
    }

    #[tokio::test]
    async fn save_without_max_age_never_expires() {
        let (store, storage) = storage();

        let mut session = storage.load(&HeaderMap::new()).await.unwrap();
        session.insert("a", 1);
        storage.save(&mut HeaderMap::new(), &mut session).await.unwrap();

        let key = storage.stored_key(session.identity().unwrap());
        assert_eq!(store.get(&key).await.unwrap().expire, None);
    }

    #[tokio::test]
    async fn save_invalidated() {
        let (store, storage) = storage();
        put(&store, "abc", json!({"created": 7, "session": {"a": 1}})).await;

        let mut session = storage.load(&with_cookie("abc")).await.unwrap();
        session.invalidate();

        let mut headers = HeaderMap::new();
        storage.save(&mut headers, &mut session).await.unwrap();

        assert!(
            set_cookie(&headers).starts_with("session=; Max-Age=0; Path=/; HttpOnly; Expires=")
        );
        let record = store.get(&StoredKey::new("session", "abc")).await.unwrap();
        assert_eq!(record.data, Some(json!({})));
    }

    #[tokio::test]
    async fn save_twice_keeps_one_record() {
        let (store, storage) = storage();
        put(&store, "abc", json!({"created": 7, "session": {"a": 1}})).await;

        for value in [2, 3] {
            let mut session = storage.load(&with_cookie("abc")).await.unwrap();
            session.insert("a", value);
            storage.save(&mut HeaderMap::new(), &mut session).await.unwrap();
        }

        assert_eq!(store.len().await, 1);
        let session = storage.load(&with_cookie("abc")).await.unwrap();
        assert_eq!(session.get("a"), Some(&json!(3)));
        assert_eq!(session.created(), 7);
    }

    #[tokio::test]
    async fn json_string_codec() {
        let store = MemCollection::new();
        let storage = SessionStorage::builder()
            .codec(Codec::json_string())
            .key_factory(|| "k".into())
            .collection(store.clone())
            .build();

        let mut session = storage.load(&HeaderMap::new()).await.unwrap();
        session.insert("a", 1);
        storage.save(&mut HeaderMap::new(), &mut session).await.unwrap();

        let record = store.get(&StoredKey::new("session", "k")).await.unwrap();
        assert!(record.data.unwrap().is_string());

        let loaded = storage.load(&with_cookie("k")).await.unwrap();
        assert_eq!(loaded.get("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn encode_failure_leaves_no_trace() {
        let store = MemCollection::new();
        let storage = SessionStorage::builder()
            .codec(Codec::new(|_| Err(CodecError::Malformed("nope".into())), Ok))
            .key_factory(|| "test-key".into())
            .collection(store.clone())
            .build();

        let mut session = storage.load(&HeaderMap::new()).await.unwrap();
        session.insert("a", 1);

        let mut headers = HeaderMap::new();
        let result = storage.save(&mut headers, &mut session).await;

        assert!(matches!(result, Err(SaveError::Encode(_))));
        assert!(headers.get(SET_COOKIE).is_none());
        assert!(session.identity().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn unserializable_identity_is_not_stored() {
        let store = MemCollection::new();
        let storage = SessionStorage::builder()
            .key_factory(|| "bad\nvalue".into())
            .collection(store.clone())
            .build();

        let mut session = storage.load(&HeaderMap::new()).await.unwrap();
        session.insert("a", 1);

        let mut headers = HeaderMap::new();
        let result = storage.save(&mut headers, &mut session).await;

        assert!(matches!(result, Err(SaveError::Cookie(_))));
        assert!(headers.get(SET_COOKIE).is_none());
        assert!(session.identity().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn store_failure_sets_no_cookie() {
        let storage = SessionStorage::builder()
            .key_factory(|| "test-key".into())
            .collection(Unreachable)
            .build();

        let mut session = Session::new(None);
        session.insert("a", 1);

        let mut headers = HeaderMap::new();
        let result = storage.save(&mut headers, &mut session).await;

        assert!(matches!(result, Err(SaveError::Store(_))));
        assert!(headers.get(SET_COOKIE).is_none());
        assert!(session.identity().is_none());
    }

    struct Unreachable;

    impl SessionCollection for Unreachable {
        type Error = io::Error;

        async fn find_live(
            &self,
            _key: &StoredKey,
            _now: DateTime<Utc>,
        ) -> io::Result<Option<SessionRecord>> {
            Err(io::ErrorKind::ConnectionRefused.into())
        }

        async fn upsert(&self, _record: SessionRecord) -> io::Result<()> {
            Err(io::ErrorKind::ConnectionRefused.into())
        }

        async fn delete_expired(&self, _now: DateTime<Utc>) -> io::Result<u64> {
            Err(io::ErrorKind::ConnectionRefused.into())
        }
    }
}
