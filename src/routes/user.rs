//! User registration and profile endpoints.

use crate::auth::middleware::{AppState, AuthSession};
use crate::auth::password::hash_password;
use crate::error::AppError;
use crate::models::{CreateUserRequest, MessageResponse, User, UserInfo};
use crate::storage::{normalize_email, StoreError};
use axum::{extract::State, http::StatusCode, Json};
use once_cell::sync::Lazy;
use regex::Regex;

const MIN_USERNAME_LEN: usize = 2;
const MIN_PASSWORD_LEN: usize = 7;
const MAX_FIELD_LEN: usize = 256;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,4}$").expect("static email pattern")
});

/// Check a registration body, returning the normalized email.
fn validate_new_user(req: &CreateUserRequest) -> Result<String, AppError> {
    let username = req.username.trim();
    if username.chars().count() < MIN_USERNAME_LEN || username.len() > MAX_FIELD_LEN {
        return Err(AppError::BadRequest(format!(
            "Username must be at least {} characters",
            MIN_USERNAME_LEN
        )));
    }

    if req.password.chars().count() < MIN_PASSWORD_LEN || req.password.len() > MAX_FIELD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let email = normalize_email(&req.email);
    if email.len() > MAX_FIELD_LEN || !EMAIL_RE.is_match(&email) {
        return Err(AppError::BadRequest("Invalid email".to_string()));
    }

    Ok(email)
}

/// POST /user: Register a new account
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let email = validate_new_user(&req)?;

    // Argon2 is CPU-bound
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing panicked: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

    let user = User {
        id: nanoid::nanoid!(12),
        username: req.username.trim().to_string(),
        email,
        password_hash,
        is_admin: false,
    };

    match state.engine.users().insert(&user).await {
        Ok(()) => {}
        Err(StoreError::Duplicate(_)) => {
            return Err(AppError::BadRequest("Email already registered".to_string()));
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(action = "user_created", user_id = %user.id, "User created");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User created successfully")),
    ))
}

/// GET /me: Profile of the authenticated user
pub async fn me(
    session: AuthSession,
    State(state): State<AppState>,
) -> Result<Json<UserInfo>, AppError> {
    let user = state
        .engine
        .users()
        .find_by_id(&session.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;

    Ok(Json(UserInfo::from(&user)))
}
