use std::{borrow::Cow, error::Error, fmt::Display, sync::Arc, time::Duration};

use cookie_monster::CookieBuilder;

use crate::{
    storage::{Codec, CookieParams, SessionCollection, SessionStorage, uuid_key},
    utils::parse_env,
};

/// Mints the identity of a new session.
pub type KeyFactory = Arc<dyn Fn() -> String + Send + Sync>;

/// Everything a [`SessionStorage`] needs apart from its collection.
#[derive(Clone)]
pub struct StorageConfig {
    pub cookie: CookieParams,
    pub key_factory: KeyFactory,
    pub codec: Codec,
    /// Interval of the expired session sweep. `None` disables it.
    pub delete_expired_every: Option<Duration>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cookie: CookieParams::default(),
            key_factory: Arc::new(uuid_key),
            codec: Codec::identity(),
            delete_expired_every: None,
        }
    }
}

impl StorageConfig {
    /// Defaults overridden by `SESSION_COOKIE_NAME`, `SESSION_COOKIE_DOMAIN`,
    /// `SESSION_COOKIE_PATH`, `SESSION_COOKIE_SECURE`, `SESSION_MAX_AGE_SECS`
    /// and `SESSION_SWEEP_SECS`.
    pub fn from_env() -> Result<Self, StorageBuilderError> {
        let mut config = Self::default();

        if let Some(name) = parse_env::<String>("SESSION_COOKIE_NAME")? {
            config.cookie.update(|c| c.name(name));
        }
        if let Some(domain) = parse_env::<String>("SESSION_COOKIE_DOMAIN")? {
            config.cookie.update(|c| c.domain(domain));
        }
        if let Some(path) = parse_env::<String>("SESSION_COOKIE_PATH")? {
            config.cookie.update(|c| c.path(path));
        }
        if let Some(secure) = parse_env::<bool>("SESSION_COOKIE_SECURE")? {
            config.cookie.update(|c| c.set_secure(secure));
        }
        if let Some(secs) = parse_env::<u64>("SESSION_MAX_AGE_SECS")? {
            config.cookie.max_age = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_env::<u64>("SESSION_SWEEP_SECS")? {
            config.delete_expired_every = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), StorageBuilderError> {
        let name = self.cookie.name();
        if name.is_empty() {
            return Err(StorageBuilderError::EmptyCookieName);
        }

        if name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | '=' | ','))
        {
            return Err(StorageBuilderError::InvalidCookieName(name.to_string()));
        }

        if self.delete_expired_every == Some(Duration::ZERO) {
            return Err(StorageBuilderError::ZeroSweepInterval);
        }

        Ok(())
    }
}

pub struct SessionStorageBuilder<C> {
    collection: C,
    config: StorageConfig,
}

impl SessionStorageBuilder<()> {
    pub fn new() -> SessionStorageBuilder<()> {
        Self {
            collection: (),
            config: StorageConfig::default(),
        }
    }
}

impl Default for SessionStorageBuilder<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SessionStorageBuilder<C> {
    /// Replaces every setting made so far.
    pub fn config(mut self, config: StorageConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cookie_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.config.cookie.update(|c| c.name(name));
        self
    }

    /// Adjusts the cookie attributes (domain, path, flags) starting from the
    /// current ones. Max-Age and Expires always follow the session's max age.
    pub fn cookie(mut self, f: impl FnOnce(CookieBuilder) -> CookieBuilder) -> Self {
        self.config.cookie.update(f);
        self
    }

    /// Lifetime of both the cookie and the stored record.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.config.cookie.max_age = Some(max_age);
        self
    }

    pub fn key_factory(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.config.key_factory = Arc::new(f);
        self
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.config.codec = codec;
        self
    }

    pub fn delete_expired_every(mut self, every: Duration) -> Self {
        self.config.delete_expired_every = Some(every);
        self
    }

    pub fn collection<C1>(self, collection: C1) -> SessionStorageBuilder<C1> {
        SessionStorageBuilder {
            collection,
            config: self.config,
        }
    }
}

impl<C: SessionCollection> SessionStorageBuilder<C> {
    pub fn try_build(self) -> Result<SessionStorage<C>, StorageBuilderError> {
        SessionStorage::new(self.collection, self.config)
    }

    /// # Panics
    ///
    /// On the conditions [`try_build`](Self::try_build) reports as errors.
    pub fn build(self) -> SessionStorage<C> {
        match self.try_build() {
            Ok(storage) => storage,
            Err(e) => panic!("invalid session storage configuration: {e}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StorageBuilderError {
    EmptyCookieName,
    InvalidCookieName(String),
    ZeroSweepInterval,
    NoRuntime,
    InvalidEnv(&'static str),
}

impl Display for StorageBuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBuilderError::EmptyCookieName => f.write_str("Cookie name is empty"),
            StorageBuilderError::InvalidCookieName(name) => {
                write!(f, "Cookie name {name:?} contains invalid characters")
            }
            StorageBuilderError::ZeroSweepInterval => {
                f.write_str("Expired session sweep interval must be non-zero")
            }
            StorageBuilderError::NoRuntime => {
                f.write_str("Expired session sweep needs a running tokio runtime")
            }
            StorageBuilderError::InvalidEnv(name) => write!(f, "env: {name} has an invalid value"),
        }
    }
}

impl Error for StorageBuilderError {}
