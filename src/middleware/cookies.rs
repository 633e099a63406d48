// Cookie helpers for the session and persistence cookies

use axum::http::header::{COOKIE, InvalidHeaderValue};
use axum::http::{HeaderMap, HeaderValue};
use std::time::Duration;

use crate::session::SessionConfig;

/// Cookie used for authentication and authorization
pub const SESSION_COOKIE: &str = "sid";

/// Cookie used for login persistence
pub const PERSIST_COOKIE: &str = "persist";

/// Extract a cookie value from request headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

fn build_cookie(
    name: &str,
    value: &str,
    max_age: Duration,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    // Frontend runs on a different origin, so SameSite=Strict is not an option
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        name,
        value,
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// `Set-Cookie` value for a session token
pub fn session_cookie(token: &str, config: &SessionConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        SESSION_COOKIE,
        token,
        config.session_window(),
        config.cookie_secure,
    )
}

/// `Set-Cookie` value for a persistent compound id
pub fn persist_cookie(
    compound_id: &str,
    config: &SessionConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(
        PERSIST_COOKIE,
        compound_id,
        config.persist_window(),
        config.cookie_secure,
    )
}
