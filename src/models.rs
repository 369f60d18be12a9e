//! Request and response models for the API.
//!
//! All models use serde for serialization/deserialization.
//! Storage models represent records held by the credential store and user directory.

use serde::{Deserialize, Serialize};

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

// ============================================================================
// Auth Models
// ============================================================================

/// Body of `POST /login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Generic `{ "message": ... }` response body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// User Models
// ============================================================================

/// Body of `POST /user`.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Public view of a user (never includes the password verifier).
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
        }
    }
}

// ============================================================================
// Storage Models
// ============================================================================

/// User record as held by the user directory.
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub is_admin: bool,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("is_admin", &self.is_admin)
            .finish()
    }
}

/// Server-side state of one refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalCredential {
    pub id: String,
    pub user_id: String,
    /// `jti` of the refresh token this row authorizes.
    pub token_id: String,
    pub expires_at: u64,
    pub revoked: bool,
}

impl RenewalCredential {
    /// Build a fresh, non-revoked credential for a refresh token.
    pub fn new(user_id: &str, token_id: &str, expires_at: u64) -> Self {
        Self {
            id: nanoid::nanoid!(16),
            user_id: user_id.to_string(),
            token_id: token_id.to_string(),
            expires_at,
            revoked: false,
        }
    }

    /// Whether this credential may still be used for rotation at `now`.
    pub fn is_active(&self, now: u64) -> bool {
        !self.revoked && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_activity() {
        let now = now_secs();
        let mut cred = RenewalCredential::new("u1", "jti-1", now + 60);
        assert!(cred.is_active(now));
        assert!(!cred.is_active(now + 60));

        cred.revoked = true;
        assert!(!cred.is_active(now));
    }

    #[test]
    fn test_credential_ids_are_unique() {
        let a = RenewalCredential::new("u1", "jti-1", 1);
        let b = RenewalCredential::new("u1", "jti-1", 1);
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 16);
    }

    #[test]
    fn test_user_debug_redacts_hash() {
        let user = User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            is_admin: false,
        };
        let debug = format!("{:?}", user);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("argon2id"));

        let info = UserInfo::from(&user);
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "a@x.com");
    }
}
