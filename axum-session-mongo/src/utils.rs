use std::{env, str::FromStr, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};

use crate::storage::StorageBuilderError;

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

pub fn utc_now_secs() -> i64 {
    utc_now().timestamp()
}

/// `now + duration`, or `None` when the result does not fit in a timestamp.
pub(crate) fn add_duration(now: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    let delta = TimeDelta::from_std(duration).ok()?;
    now.checked_add_signed(delta)
}

/// Reads and parses an environment variable. `Ok(None)` when it is unset.
pub(crate) fn parse_env<T: FromStr>(
    name: &'static str,
) -> Result<Option<T>, StorageBuilderError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StorageBuilderError::InvalidEnv(name)),
        Err(_) => Ok(None),
    }
}
