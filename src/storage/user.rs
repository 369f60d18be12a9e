//! User Redis operations.
//!
//! Redis key patterns:
//! - `user:{nanoid}`: individual user data (JSON)
//! - `email:{email}`: normalized email lookup to user_id (STRING)
//!
//! ## Security: Zeroizing Sensitive Data
//!
//! User JSON carries the Argon2 password verifier, so raw JSON read from Redis
//! is wrapped in `Zeroizing` and cleared once deserialized.

use super::{normalize_email, StoreError, UserDirectory};
use crate::models::User;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use zeroize::Zeroizing;

/// Redis-backed [`UserDirectory`].
#[derive(Clone)]
pub struct RedisUserDirectory {
    client: redis::Client,
}

impl RedisUserDirectory {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

/// Get a user by ID.
///
/// The user JSON is zeroized after deserialization.
async fn get_user<C>(con: &mut C, id: &str) -> Result<Option<User>, StoreError>
where
    C: AsyncCommands,
{
    let key = format!("user:{}", id);
    let json: Option<String> = con.get(&key).await?;

    match json {
        Some(data) => {
            let zeroizing_data = Zeroizing::new(data);
            let user = serde_json::from_str(&zeroizing_data)?;
            Ok(Some(user))
        }
        None => Ok(None),
    }
}

#[async_trait]
impl UserDirectory for RedisUserDirectory {
    /// Performs a two-step lookup: email -> user_id -> user data.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut con = self.connection().await?;

        let email_key = format!("email:{}", normalize_email(email));
        let user_id: Option<String> = con.get(&email_key).await?;

        match user_id {
            Some(id) => get_user(&mut con, &id).await,
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let mut con = self.connection().await?;
        get_user(&mut con, id).await
    }

    /// Claims the email key with `SET NX` first so two concurrent sign-ups
    /// for one address cannot both succeed.
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let mut con = self.connection().await?;

        let mut user = user.clone();
        user.email = normalize_email(&user.email);

        let user_key = format!("user:{}", user.id);
        let email_key = format!("email:{}", user.email);

        let claimed: bool = con.set_nx(&email_key, &user.id).await?;
        if !claimed {
            return Err(StoreError::Duplicate(user.email));
        }

        let json = Zeroizing::new(serde_json::to_string(&user)?);
        if let Err(e) = con.set::<_, _, ()>(&user_key, json.as_str()).await {
            // Release the email so the address is not left pointing at nothing
            let _: Result<(), _> = con.del(&email_key).await;
            return Err(e.into());
        }

        Ok(())
    }
}
