//! Authgate entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Connect to Redis
//! 3. Build the token codec and session engine over the Redis stores
//! 4. Build router with API routes, security headers, CORS, and panic recovery
//! 5. Start Axum server

use authgate::{
    auth::{AppState, SessionEngine, TokenCodec},
    config::Config,
    routes,
    storage::{RedisCredentialStore, RedisUserDirectory},
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config from environment
    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting authgate on {}", config.bind_addr);

    // Connect to Redis
    let redis_client = redis::Client::open(config.redis_url.as_str()).expect("Invalid Redis URL");

    // Verify Redis connection before accepting traffic
    redis_client
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to connect to Redis");

    let codec = TokenCodec::new(
        config.access_token_secret.as_bytes(),
        config.refresh_token_secret.as_bytes(),
    );
    let engine = SessionEngine::new(
        codec,
        Arc::new(RedisCredentialStore::new(redis_client.clone())),
        Arc::new(RedisUserDirectory::new(redis_client)),
        config.access_token_ttl_secs,
        config.refresh_token_ttl_secs,
    );

    let bind_addr = config.bind_addr;
    let state = AppState {
        engine: Arc::new(engine),
        config: Arc::new(config),
    };

    let app = routes::app(state);

    // Bind to configured address
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
