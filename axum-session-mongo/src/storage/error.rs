use std::{error::Error, fmt::Display};

use crate::storage::{CodecError, CookieError};

/// Why a session could not be saved. `E` is the collection's error type.
#[derive(Debug)]
pub enum SaveError<E> {
    Store(E),
    Encode(CodecError),
    Cookie(CookieError),
}

impl<E: Display> Display for SaveError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveError::Store(e) => write!(f, "session store failed: {e}"),
            SaveError::Encode(e) => write!(f, "could not encode session: {e}"),
            SaveError::Cookie(e) => e.fmt(f),
        }
    }
}

impl<E: Error + 'static> Error for SaveError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SaveError::Store(e) => Some(e),
            SaveError::Encode(e) => Some(e),
            SaveError::Cookie(e) => Some(e),
        }
    }
}
