//! Request gate and the session extractor for protected routes.

use crate::auth::cookie::{append_pair, token_value, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::auth::engine::{SessionEngine, SessionError};
use crate::config::Config;
use crate::error::AppError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SessionEngine>,
    pub config: Arc<Config>,
}

/// Authenticated session extractor.
///
/// Only available behind [`require_session`], which places it in the request
/// extensions. Returns 401 Unauthorized when absent.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: String,
    /// Token id of the refresh credential minted while gating this request.
    pub rotated_token_id: Option<String>,
}

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthSession>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))
    }
}

/// Gate protected routes on the session cookies.
///
/// A valid access cookie admits the request as-is. Otherwise the refresh
/// cookie is rotated and the new pair is set on the response, except for any
/// cookie the handler already wrote itself.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let access = token_value(&jar, ACCESS_COOKIE);
    let renewal = token_value(&jar, REFRESH_COOKIE);

    let validated = match state
        .engine
        .validate(access.as_deref(), renewal.as_deref())
        .await
    {
        Ok(validated) => validated,
        Err(e) => return reject(e).into_response(),
    };

    request.extensions_mut().insert(AuthSession {
        user_id: validated.user_id,
        rotated_token_id: validated
            .rotated
            .as_ref()
            .map(|pair| pair.renewal.claims.jti.clone()),
    });

    let mut response = next.run(request).await;

    if let Some(pair) = validated.rotated {
        append_pair(response.headers_mut(), &pair, state.config.cookie_secure);
    }

    response
}

/// Failures while gating are always reported as 401.
fn reject(err: SessionError) -> AppError {
    match err {
        SessionError::Persistence(_) | SessionError::Internal(_) => {
            tracing::error!(action = "rotation_failed", error = %err, "Could not rotate refresh token");
            AppError::Unauthorized("Unauthorized".to_string())
        }
        other => AppError::from(other),
    }
}
