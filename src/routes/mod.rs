//! API route handlers.

pub mod auth;
pub mod user;

use crate::auth::middleware::{require_session, AppState};
use crate::middleware::{handle_panic, security_headers};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

/// Build the API router with all endpoints.
///
/// `/logout` and `/me` sit behind the request gate; `/login` and `/user` are
/// public.
pub fn api_router(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(user::me))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/login", post(auth::login))
        .route("/user", post(user::create_user))
        .merge(protected)
}

/// Full application: routes plus CORS, security headers, and panic recovery.
pub fn app(state: AppState) -> Router {
    // Deny all cross-origin requests; cookies are SameSite=Strict anyway.
    let cors = CorsLayer::new();

    api_router(&state)
        .layer(cors)
        .layer(from_fn(security_headers))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}
