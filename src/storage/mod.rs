//! Storage layer for refresh credentials and users.
//!
//! The session engine only sees the [`CredentialStore`] and [`UserDirectory`]
//! traits. Two implementations exist for each: Redis-backed (production) and
//! in-memory (tests and single-process deployments).

pub mod credential;
pub mod memory;
pub mod user;

use crate::models::{RenewalCredential, User};
use async_trait::async_trait;

pub use credential::RedisCredentialStore;
pub use memory::{MemoryCredentialStore, MemoryUserDirectory};
pub use user::RedisUserDirectory;

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),
}

/// Durable refresh-credential state, keyed by token identifier.
///
/// Implementations must make [`CredentialStore::revoke`] and
/// [`CredentialStore::rotate`] atomic: when two callers race on the same
/// token identifier, exactly one of them observes the row as active.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new credential row.
    async fn insert(&self, credential: &RenewalCredential) -> Result<(), StoreError>;

    /// Look up a row by its credential id, regardless of state.
    async fn get(&self, id: &str) -> Result<Option<RenewalCredential>, StoreError>;

    /// Look up a row by token identifier, returning it only if it is
    /// non-revoked and unexpired at `now`.
    async fn find_valid(
        &self,
        token_id: &str,
        now: u64,
    ) -> Result<Option<RenewalCredential>, StoreError>;

    /// Flip `revoked` from false to true. Returns whether the flip applied.
    async fn revoke(&self, token_id: &str) -> Result<bool, StoreError>;

    /// Delete a row by token identifier. Returns whether a row existed.
    async fn delete(&self, token_id: &str) -> Result<bool, StoreError>;

    /// Delete every row owned by a user. Returns the number removed.
    async fn delete_for_user(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Delete every row owned by `credential.user_id` and insert `credential`,
    /// as one atomic unit. Returns the number of rows removed.
    ///
    /// Two overlapping calls for the same user leave exactly one of the two
    /// new rows behind.
    async fn replace_for_user(&self, credential: &RenewalCredential) -> Result<u64, StoreError>;

    /// All rows owned by a user that are active at `now`.
    async fn active_for_user(
        &self,
        user_id: &str,
        now: u64,
    ) -> Result<Vec<RenewalCredential>, StoreError>;

    /// Atomically consume `old_token_id` and activate `next`.
    ///
    /// Succeeds only if the old row is active at `now`; in that case the new
    /// row is inserted and the old row revoked as one unit. Returns `false`
    /// without writing anything otherwise.
    async fn rotate(
        &self,
        old_token_id: &str,
        next: &RenewalCredential,
        now: u64,
    ) -> Result<bool, StoreError>;
}

/// Read access to user records, plus the insert used by sign-up.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a (normalized) email to a user.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Insert a new user. Fails with [`StoreError::Duplicate`] if the email is taken.
    async fn insert(&self, user: &User) -> Result<(), StoreError>;
}

/// Canonical form of an email used as a lookup key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
