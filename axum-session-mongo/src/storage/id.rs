use uuid::Uuid;

/// The key a session record is stored under: `"{cookie_name}_{identity}"` as bytes.
///
/// Prefixing the identity with the cookie name keeps applications that share
/// one collection from reading each other's sessions.
#[derive(Debug, Hash, Clone, PartialEq, Eq)]
pub struct StoredKey(Box<[u8]>);

impl StoredKey {
    pub fn new(cookie_name: &str, identity: &str) -> Self {
        StoredKey(format!("{cookie_name}_{identity}").into_bytes().into_boxed_slice())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for StoredKey {
    fn from(value: Vec<u8>) -> Self {
        Self(value.into_boxed_slice())
    }
}

/// Default key factory: a random v4 uuid as 32 lowercase hex characters.
pub fn uuid_key() -> String {
    Uuid::new_v4().simple().to_string()
}
