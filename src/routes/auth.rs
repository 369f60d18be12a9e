//! Login and logout endpoints.

use crate::auth::cookie::{cleared, token_value, with_pair, REFRESH_COOKIE};
use crate::auth::middleware::{AppState, AuthSession};
use crate::error::AppError;
use crate::models::{LoginRequest, MessageResponse};
use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;

/// POST /login: Verify credentials and set the session cookies
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    let pair = state.engine.login(&req.email, &req.password).await?;

    let jar = with_pair(jar, &pair, state.config.cookie_secure);
    Ok((jar, Json(MessageResponse::new("Login successful"))))
}

/// POST /logout: Forget the refresh credential and clear both cookies
///
/// Runs behind the request gate. If the gate just rotated the session, the
/// credential it minted is discarded too, and the cleared cookies written here
/// are the ones the client receives.
pub async fn logout(
    session: AuthSession,
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let presented = token_value(&jar, REFRESH_COOKIE);
    state.engine.logout(presented.as_deref()).await;

    if let Some(token_id) = &session.rotated_token_id {
        state.engine.discard_renewal(token_id).await;
    }

    tracing::info!(action = "logout", user_id = %session.user_id, "User logged out");

    (
        cleared(jar, state.config.cookie_secure),
        Json(MessageResponse::new("Logged out successfully")),
    )
}
