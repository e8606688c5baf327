use std::{error::Error, fmt::Display, sync::Arc};

use serde_json::Value;

type CodecFn = Arc<dyn Fn(Value) -> Result<Value, CodecError> + Send + Sync>;

/// Encoder/decoder pair applied to the session payload on its way to and from
/// the store.
#[derive(Clone)]
pub struct Codec {
    encode: CodecFn,
    decode: CodecFn,
}

impl Codec {
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(Value) -> Result<Value, CodecError> + Send + Sync + 'static,
        D: Fn(Value) -> Result<Value, CodecError> + Send + Sync + 'static,
    {
        Self {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    /// Stores the payload as is. This is the default.
    pub fn identity() -> Self {
        Self::new(Ok, Ok)
    }

    /// Stores the payload as a JSON string.
    pub fn json_string() -> Self {
        Self::new(
            |value| Ok(Value::String(serde_json::to_string(&value)?)),
            |value| match value {
                Value::String(s) => Ok(serde_json::from_str(&s)?),
                _ => Err(CodecError::Malformed("expected a JSON string".into())),
            },
        )
    }

    pub fn encode(&self, value: Value) -> Result<Value, CodecError> {
        (self.encode)(value)
    }

    pub fn decode(&self, value: Value) -> Result<Value, CodecError> {
        (self.decode)(value)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug)]
pub enum CodecError {
    Malformed(String),
    Json(serde_json::Error),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Malformed(reason) => write!(f, "malformed session payload: {reason}"),
            CodecError::Json(e) => write!(f, "invalid session json: {e}"),
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CodecError::Json(e) => Some(e),
            CodecError::Malformed(_) => None,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(value: serde_json::Error) -> Self {
        CodecError::Json(value)
    }
}
