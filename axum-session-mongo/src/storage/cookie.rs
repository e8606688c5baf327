use std::{error::Error, fmt::Display, time::Duration};

use axum::http::{
    HeaderMap, HeaderValue,
    header::{InvalidHeaderValue, SET_COOKIE},
};
use cookie_monster::{Cookie, CookieBuilder, CookieJar, Expires};

use crate::utils::{add_duration, utc_now};

pub(crate) static DEFAULT_SESSION_COOKIE_NAME: &str = "session";

/// Attributes of the identity cookie.
///
/// `builder` carries name, domain, path and flags. Max-Age and Expires are
/// derived from `max_age` on every save.
#[derive(Debug, Clone)]
pub struct CookieParams {
    pub builder: CookieBuilder,
    pub max_age: Option<Duration>,
}

impl Default for CookieParams {
    fn default() -> Self {
        Self {
            builder: Cookie::named(DEFAULT_SESSION_COOKIE_NAME)
                .path("/")
                .http_only(),
            max_age: None,
        }
    }
}

impl CookieParams {
    pub fn name(&self) -> &str {
        self.builder.get_name()
    }

    pub(crate) fn update(&mut self, f: impl FnOnce(CookieBuilder) -> CookieBuilder) {
        self.builder = f(self.builder.clone());
    }

    /// The session identity carried by the request, if any.
    pub fn load_cookie(&self, headers: &HeaderMap) -> Option<String> {
        let jar = CookieJar::from_headers(headers);
        let cookie = jar.get(self.name())?;

        let value = cookie.value();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    /// Appends a `Set-Cookie` header. An empty `value` removes the cookie.
    pub fn save_cookie(
        &self,
        headers: &mut HeaderMap,
        value: &str,
        max_age: Option<Duration>,
    ) -> Result<(), CookieError> {
        let header = self.cookie_header(value, max_age)?;
        headers.append(SET_COOKIE, header);
        Ok(())
    }

    /// The serialized `Set-Cookie` value [`save_cookie`](Self::save_cookie) would append.
    pub fn cookie_header(
        &self,
        value: &str,
        max_age: Option<Duration>,
    ) -> Result<HeaderValue, CookieError> {
        let cookie = if value.is_empty() {
            self.removal_cookie()
        } else {
            self.session_cookie(value, max_age)
        };

        let header = HeaderValue::try_from(cookie.serialize()?)?;
        Ok(header)
    }

    fn session_cookie(&self, value: &str, max_age: Option<Duration>) -> Cookie {
        let mut cookie = self.builder.clone().value(value.to_owned()).build();

        match max_age {
            Some(max_age) => {
                cookie.set_max_age(max_age);
                if let Some(expires) = add_duration(utc_now(), max_age) {
                    cookie.set_expires(expires);
                }
            }
            None => {
                cookie.unset_max_age();
                cookie.set_expires(Expires::Session);
            }
        }

        cookie
    }

    // Same attributes as `Cookie::remove`, but keeping domain and path so the
    // user agent matches the cookie it has to drop.
    fn removal_cookie(&self) -> Cookie {
        self.builder
            .clone()
            .value("")
            .max_age_secs(0)
            .expires(Expires::remove())
            .build()
    }
}

#[derive(Debug)]
pub enum CookieError {
    Serialize(cookie_monster::Error),
    Header(InvalidHeaderValue),
}

impl Display for CookieError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CookieError::Serialize(e) => write!(f, "could not serialize session cookie: {e}"),
            CookieError::Header(e) => write!(f, "session cookie is not a valid header: {e}"),
        }
    }
}

impl Error for CookieError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CookieError::Serialize(e) => Some(e),
            CookieError::Header(e) => Some(e),
        }
    }
}

impl From<cookie_monster::Error> for CookieError {
    fn from(e: cookie_monster::Error) -> Self {
        CookieError::Serialize(e)
    }
}

impl From<InvalidHeaderValue> for CookieError {
    fn from(e: InvalidHeaderValue) -> Self {
        CookieError::Header(e)
    }
}
