//! Session cookies.
//!
//! Both tokens travel as HttpOnly, SameSite=Strict cookies whose expiry
//! matches the `exp` claim of the token they carry.

use crate::auth::engine::{IssuedToken, TokenPair};
use axum::http::{header::SET_COOKIE, HeaderMap, HeaderValue};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::OffsetDateTime;

/// Access token cookie.
pub const ACCESS_COOKIE: &str = "token";

/// Refresh token cookie.
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Cookie carrying `token`, expiring with it.
pub fn token_cookie(name: &'static str, token: &IssuedToken, secure: bool) -> Cookie<'static> {
    let expires = OffsetDateTime::from_unix_timestamp(token.claims.exp as i64)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);

    Cookie::build((name, token.value.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .expires(expires)
        .build()
}

/// Empty, already-expired cookie that makes the client drop `name`.
pub fn cleared_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .max_age(time::Duration::ZERO)
        .build()
}

/// Add both cookies of `pair` to `jar`.
pub fn with_pair(jar: CookieJar, pair: &TokenPair, secure: bool) -> CookieJar {
    jar.add(token_cookie(ACCESS_COOKIE, &pair.access, secure))
        .add(token_cookie(REFRESH_COOKIE, &pair.renewal, secure))
}

/// Add cleared versions of both session cookies to `jar`.
pub fn cleared(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(cleared_cookie(ACCESS_COOKIE, secure))
        .add(cleared_cookie(REFRESH_COOKIE, secure))
}

/// Non-empty value of cookie `name` in `jar`.
pub fn token_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Whether `headers` already contain a `Set-Cookie` for `name`.
pub fn sets_cookie(headers: &HeaderMap, name: &str) -> bool {
    headers.get_all(SET_COOKIE).iter().any(|value| {
        value
            .to_str()
            .ok()
            .and_then(|v| v.split_once('='))
            .is_some_and(|(n, _)| n.trim() == name)
    })
}

/// Append `Set-Cookie` headers for both cookies of `pair`, skipping any cookie
/// whose name `headers` already set.
pub fn append_pair(headers: &mut HeaderMap, pair: &TokenPair, secure: bool) {
    let pending: Vec<Cookie<'static>> = [
        token_cookie(ACCESS_COOKIE, &pair.access, secure),
        token_cookie(REFRESH_COOKIE, &pair.renewal, secure),
    ]
    .into_iter()
    .filter(|cookie| !sets_cookie(headers, cookie.name()))
    .collect();

    for cookie in pending {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "Unencodable session cookie"),
        }
    }
}
