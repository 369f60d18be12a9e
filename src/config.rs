use std::env;
use std::net::SocketAddr;

/// Minimum length of each signing secret, in bytes (HS256 key size).
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Clone)]
pub struct Config {
    // Signing secrets
    pub access_token_secret: String,
    pub refresh_token_secret: String,

    // Redis
    pub redis_url: String,

    // Server
    pub bind_addr: SocketAddr,

    // TTLs (in seconds)
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,

    // Cookies
    pub cookie_secure: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("access_token_secret", &"[REDACTED]")
            .field("refresh_token_secret", &"[REDACTED]")
            .field("redis_url", &"[REDACTED]")
            .field("bind_addr", &self.bind_addr)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        let access_token_secret = required_secret("ACCESS_TOKEN_SECRET")?;
        let refresh_token_secret = required_secret("REFRESH_TOKEN_SECRET")?;

        if access_token_secret == refresh_token_secret {
            return Err(ConfigError::InvalidValue(
                "REFRESH_TOKEN_SECRET".to_string(),
                "must differ from ACCESS_TOKEN_SECRET".to_string(),
            ));
        }

        // Redis (required)
        let redis_url =
            env::var("REDIS_URL").map_err(|_| ConfigError::MissingVar("REDIS_URL".to_string()))?;

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;

        // TTLs
        let access_token_ttl_secs: i64 = parse_env_or_default("ACCESS_TOKEN_TTL_SECS", 300)?;
        let refresh_token_ttl_secs: i64 =
            parse_env_or_default("REFRESH_TOKEN_TTL_SECS", 29 * 24 * 60 * 60)?;

        if access_token_ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "ACCESS_TOKEN_TTL_SECS".to_string(),
                "must be positive".to_string(),
            ));
        }
        if refresh_token_ttl_secs <= access_token_ttl_secs {
            return Err(ConfigError::InvalidValue(
                "REFRESH_TOKEN_TTL_SECS".to_string(),
                "must be longer than ACCESS_TOKEN_TTL_SECS".to_string(),
            ));
        }

        // Cookies
        let cookie_secure = parse_env_or_default("COOKIE_SECURE", false)?;

        Ok(Config {
            access_token_secret,
            refresh_token_secret,
            redis_url,
            bind_addr,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            cookie_secure,
        })
    }
}

/// Read a signing secret, enforcing presence and minimum length.
fn required_secret(key: &str) -> Result<String, ConfigError> {
    let secret = env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))?;

    if secret.len() < MIN_SECRET_BYTES {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be at least {} bytes", MIN_SECRET_BYTES),
        ));
    }

    Ok(secret)
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
