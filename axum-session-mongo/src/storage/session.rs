use std::{sync::Arc, time::Duration};

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, MutexGuard};

use crate::utils::utc_now_secs;

/// Per request session state.
///
/// Every mutation marks the session as changed; only changed sessions are
/// written back by the middleware.
#[derive(Debug, Clone)]
pub struct Session {
    identity: Option<String>,
    data: Map<String, Value>,
    created: i64,
    is_new: bool,
    changed: bool,
    max_age: Option<Duration>,
}

impl Session {
    /// A fresh session without identity. One is minted when it is saved.
    pub fn new(max_age: Option<Duration>) -> Self {
        Self {
            identity: None,
            data: Map::new(),
            created: utc_now_secs(),
            is_new: true,
            changed: false,
            max_age,
        }
    }

    /// Rebuilds a stored session from its decoded payload.
    ///
    /// `None` or a payload without a `session` object gives an empty session
    /// that still carries `identity`.
    pub fn from_payload(identity: String, payload: Option<Value>, max_age: Option<Duration>) -> Self {
        let (created, data) = match payload {
            Some(Value::Object(mut payload)) => {
                let created = payload.get("created").and_then(Value::as_i64);
                let data = match payload.remove("session") {
                    Some(Value::Object(data)) => data,
                    _ => Map::new(),
                };
                (created, data)
            }
            _ => (None, Map::new()),
        };

        Self {
            identity: Some(identity),
            data,
            created: created.unwrap_or_else(utc_now_secs),
            is_new: false,
            changed: false,
            max_age,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub(crate) fn set_identity(&mut self, identity: String) {
        self.identity = Some(identity);
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Unix timestamp (seconds) of when the session was first created.
    pub fn created(&self) -> i64 {
        self.created
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn set_max_age(&mut self, max_age: Option<Duration>) {
        self.max_age = max_age;
        self.changed = true;
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.data.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.changed = true;
        self.data.insert(key.into(), value.into())
    }

    pub fn insert_serialized<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Option<Value>, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.insert(key, value))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.changed = true;
        }
        removed
    }

    /// Drops all data. The next save clears the cookie and empties the record.
    pub fn invalidate(&mut self) {
        self.data.clear();
        self.changed = true;
    }

    /// Forces a save, e.g. after mutating a nested value in place.
    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// The value handed to the encoder: `{}` for an empty session, otherwise
    /// `{"created": .., "session": {..}}`.
    pub fn payload(&self) -> Value {
        if self.data.is_empty() {
            Value::Object(Map::new())
        } else {
            json!({
                "created": self.created,
                "session": self.data,
            })
        }
    }
}

/// Shared handle to the request's [`Session`], inserted by the session layer.
#[derive(Clone)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().await
    }
}

impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, StatusCode> {
        if let Some(handle) = parts.extensions.get::<SessionHandle>() {
            Ok(handle.clone())
        } else {
            tracing::error!("session layer is not installed on this route");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
