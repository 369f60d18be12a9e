//! Refresh-credential Redis operations.
//!
//! Redis key patterns:
//! - `credential:{token_id}`: credential row (HASH: id, user_id, token_id, expires_at, revoked)
//! - `credential_id:{id}`: credential id to token id lookup (STRING)
//! - `user_credentials:{user_id}`: SET of token ids owned by the user
//!
//! Rows carry an `EXPIREAT` at their own expiry so Redis reclaims them, but
//! validity is always decided by comparing `expires_at` at read time.
//!
//! Every write that must not be observed half-applied (revoke, delete, rotate,
//! replace) runs as a single Lua script.
//!
//! The delete and replace scripts derive the id-lookup and row keys they touch
//! from the prefixes passed in ARGV, so they are not declared in KEYS. This
//! requires a standalone (single-node) Redis; the scripts are not cluster-safe.

use super::{CredentialStore, StoreError};
use crate::models::RenewalCredential;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;

const CREDENTIAL_PREFIX: &str = "credential:";
const CREDENTIAL_ID_PREFIX: &str = "credential_id:";
const USER_CREDENTIALS_PREFIX: &str = "user_credentials:";

fn credential_key(token_id: &str) -> String {
    format!("{}{}", CREDENTIAL_PREFIX, token_id)
}

fn credential_id_key(id: &str) -> String {
    format!("{}{}", CREDENTIAL_ID_PREFIX, id)
}

fn user_credentials_key(user_id: &str) -> String {
    format!("{}{}", USER_CREDENTIALS_PREFIX, user_id)
}

/// Flip `revoked` 0 -> 1 only if the row exists and is not yet revoked.
const REVOKE_SCRIPT: &str = r"
    if redis.call('HGET', KEYS[1], 'revoked') == '0' then
        redis.call('HSET', KEYS[1], 'revoked', '1')
        return 1
    end
    return 0
";

/// Remove a row together with its id lookup and its membership in the user set.
const DELETE_SCRIPT: &str = r"
    local user_id = redis.call('HGET', KEYS[1], 'user_id')
    if not user_id then
        return 0
    end
    local id = redis.call('HGET', KEYS[1], 'id')
    if id then
        redis.call('DEL', ARGV[2] .. id)
    end
    redis.call('SREM', ARGV[3] .. user_id, ARGV[1])
    redis.call('DEL', KEYS[1])
    return 1
";

/// Remove every row listed in a user's set, then the set itself.
const DELETE_FOR_USER_SCRIPT: &str = r"
    local tokens = redis.call('SMEMBERS', KEYS[1])
    local removed = 0
    for _, token in ipairs(tokens) do
        local key = ARGV[1] .. token
        local id = redis.call('HGET', key, 'id')
        if id then
            redis.call('DEL', ARGV[2] .. id)
        end
        removed = removed + redis.call('DEL', key)
    end
    redis.call('DEL', KEYS[1])
    return removed
";

/// Clear a user's rows and insert the new one.
///
/// KEYS: user set, new row, new id lookup.
/// ARGV: row prefix, id-lookup prefix, new id, user id, new token id, new expires_at.
const REPLACE_FOR_USER_SCRIPT: &str = r"
    local tokens = redis.call('SMEMBERS', KEYS[1])
    local removed = 0
    for _, token in ipairs(tokens) do
        local key = ARGV[1] .. token
        local id = redis.call('HGET', key, 'id')
        if id then
            redis.call('DEL', ARGV[2] .. id)
        end
        removed = removed + redis.call('DEL', key)
    end
    redis.call('DEL', KEYS[1])
    redis.call('HSET', KEYS[2],
        'id', ARGV[3],
        'user_id', ARGV[4],
        'token_id', ARGV[5],
        'expires_at', ARGV[6],
        'revoked', '0')
    redis.call('EXPIREAT', KEYS[2], ARGV[6])
    redis.call('SET', KEYS[3], ARGV[5])
    redis.call('EXPIREAT', KEYS[3], ARGV[6])
    redis.call('SADD', KEYS[1], ARGV[5])
    redis.call('EXPIREAT', KEYS[1], ARGV[6])
    return removed
";

/// Consume the old row and activate the new one.
///
/// KEYS: old row, new row, new id lookup, user set.
/// ARGV: now, new id, user id, new token id, new expires_at.
const ROTATE_SCRIPT: &str = r"
    local old = redis.call('HMGET', KEYS[1], 'user_id', 'expires_at', 'revoked')
    if not old[1] or old[1] ~= ARGV[3] then
        return 0
    end
    if old[3] ~= '0' then
        return 0
    end
    local expires_at = tonumber(old[2])
    if not expires_at or expires_at <= tonumber(ARGV[1]) then
        return 0
    end
    redis.call('HSET', KEYS[2],
        'id', ARGV[2],
        'user_id', ARGV[3],
        'token_id', ARGV[4],
        'expires_at', ARGV[5],
        'revoked', '0')
    redis.call('EXPIREAT', KEYS[2], ARGV[5])
    redis.call('SET', KEYS[3], ARGV[4])
    redis.call('EXPIREAT', KEYS[3], ARGV[5])
    redis.call('SADD', KEYS[4], ARGV[4])
    redis.call('EXPIREAT', KEYS[4], ARGV[5])
    redis.call('HSET', KEYS[1], 'revoked', '1')
    return 1
";

fn to_fields(credential: &RenewalCredential) -> [(&'static str, String); 5] {
    [
        ("id", credential.id.clone()),
        ("user_id", credential.user_id.clone()),
        ("token_id", credential.token_id.clone()),
        ("expires_at", credential.expires_at.to_string()),
        ("revoked", if credential.revoked { "1" } else { "0" }.to_string()),
    ]
}

fn from_fields(
    mut fields: HashMap<String, String>,
) -> Result<Option<RenewalCredential>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let mut take = |name: &str| {
        fields
            .remove(name)
            .ok_or_else(|| StoreError::Corrupt(format!("credential missing field '{}'", name)))
    };

    let id = take("id")?;
    let user_id = take("user_id")?;
    let token_id = take("token_id")?;
    let expires_at = take("expires_at")?
        .parse::<u64>()
        .map_err(|e| StoreError::Corrupt(format!("credential expires_at: {}", e)))?;
    let revoked = take("revoked")? == "1";

    Ok(Some(RenewalCredential {
        id,
        user_id,
        token_id,
        expires_at,
        revoked,
    }))
}

/// Redis-backed [`CredentialStore`].
#[derive(Clone)]
pub struct RedisCredentialStore {
    client: redis::Client,
}

impl RedisCredentialStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn load(
        con: &mut MultiplexedConnection,
        token_id: &str,
    ) -> Result<Option<RenewalCredential>, StoreError> {
        let fields: HashMap<String, String> = con.hgetall(credential_key(token_id)).await?;
        from_fields(fields)
    }
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn insert(&self, credential: &RenewalCredential) -> Result<(), StoreError> {
        let mut con = self.connection().await?;

        let key = credential_key(&credential.token_id);
        let id_key = credential_id_key(&credential.id);
        let user_key = user_credentials_key(&credential.user_id);
        let expires_at = credential.expires_at as i64;

        redis::pipe()
            .atomic()
            .hset_multiple(&key, &to_fields(credential))
            .ignore()
            .expire_at(&key, expires_at)
            .ignore()
            .set(&id_key, &credential.token_id)
            .ignore()
            .expire_at(&id_key, expires_at)
            .ignore()
            .sadd(&user_key, &credential.token_id)
            .ignore()
            .expire_at(&user_key, expires_at)
            .ignore()
            .query_async::<()>(&mut con)
            .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<RenewalCredential>, StoreError> {
        let mut con = self.connection().await?;

        let token_id: Option<String> = con.get(credential_id_key(id)).await?;
        match token_id {
            Some(token_id) => Self::load(&mut con, &token_id).await,
            None => Ok(None),
        }
    }

    async fn find_valid(
        &self,
        token_id: &str,
        now: u64,
    ) -> Result<Option<RenewalCredential>, StoreError> {
        let mut con = self.connection().await?;
        let credential = Self::load(&mut con, token_id).await?;
        Ok(credential.filter(|c| c.is_active(now)))
    }

    async fn revoke(&self, token_id: &str) -> Result<bool, StoreError> {
        let mut con = self.connection().await?;
        let applied: i64 = redis::Script::new(REVOKE_SCRIPT)
            .key(credential_key(token_id))
            .invoke_async(&mut con)
            .await?;
        Ok(applied == 1)
    }

    async fn delete(&self, token_id: &str) -> Result<bool, StoreError> {
        let mut con = self.connection().await?;
        let deleted: i64 = redis::Script::new(DELETE_SCRIPT)
            .key(credential_key(token_id))
            .arg(token_id)
            .arg(CREDENTIAL_ID_PREFIX)
            .arg(USER_CREDENTIALS_PREFIX)
            .invoke_async(&mut con)
            .await?;
        Ok(deleted == 1)
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut con = self.connection().await?;
        let removed: u64 = redis::Script::new(DELETE_FOR_USER_SCRIPT)
            .key(user_credentials_key(user_id))
            .arg(CREDENTIAL_PREFIX)
            .arg(CREDENTIAL_ID_PREFIX)
            .invoke_async(&mut con)
            .await?;
        Ok(removed)
    }

    async fn replace_for_user(&self, credential: &RenewalCredential) -> Result<u64, StoreError> {
        let mut con = self.connection().await?;
        let removed: u64 = redis::Script::new(REPLACE_FOR_USER_SCRIPT)
            .key(user_credentials_key(&credential.user_id))
            .key(credential_key(&credential.token_id))
            .key(credential_id_key(&credential.id))
            .arg(CREDENTIAL_PREFIX)
            .arg(CREDENTIAL_ID_PREFIX)
            .arg(&credential.id)
            .arg(&credential.user_id)
            .arg(&credential.token_id)
            .arg(credential.expires_at)
            .invoke_async(&mut con)
            .await?;
        Ok(removed)
    }

    async fn active_for_user(
        &self,
        user_id: &str,
        now: u64,
    ) -> Result<Vec<RenewalCredential>, StoreError> {
        let mut con = self.connection().await?;
        let token_ids: Vec<String> = con.smembers(user_credentials_key(user_id)).await?;

        let mut active = Vec::new();
        for token_id in token_ids {
            if let Some(credential) = Self::load(&mut con, &token_id).await? {
                if credential.is_active(now) {
                    active.push(credential);
                }
            }
        }
        Ok(active)
    }

    async fn rotate(
        &self,
        old_token_id: &str,
        next: &RenewalCredential,
        now: u64,
    ) -> Result<bool, StoreError> {
        let mut con = self.connection().await?;
        let applied: i64 = redis::Script::new(ROTATE_SCRIPT)
            .key(credential_key(old_token_id))
            .key(credential_key(&next.token_id))
            .key(credential_id_key(&next.id))
            .key(user_credentials_key(&next.user_id))
            .arg(now)
            .arg(&next.id)
            .arg(&next.user_id)
            .arg(&next.token_id)
            .arg(next.expires_at)
            .invoke_async(&mut con)
            .await?;
        Ok(applied == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_secs;

    /// Connect to the test Redis, or `None` to skip.
    async fn test_store() -> Option<RedisCredentialStore> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let client = match redis::Client::open(redis_url) {
            Ok(c) => c,
            Err(_) => {
                eprintln!("Skipping test: Redis not available");
                return None;
            }
        };

        if client.get_multiplexed_async_connection().await.is_err() {
            eprintln!("Skipping test: Redis connection failed");
            return None;
        }

        Some(RedisCredentialStore::new(client))
    }

    fn unique_user() -> String {
        format!("test-user-{}", nanoid::nanoid!(8))
    }

    #[test]
    fn test_fields_parse() {
        let cred = RenewalCredential::new("u1", "jti-1", 1_700_000_000);
        let fields: HashMap<String, String> = to_fields(&cred)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(from_fields(fields).unwrap(), Some(cred));
    }

    #[test]
    fn test_fields_missing_is_corrupt() {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), "abc".to_string());
        assert!(matches!(from_fields(fields), Err(StoreError::Corrupt(_))));
        assert!(from_fields(HashMap::new()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_get_and_find_valid() {
        let Some(store) = test_store().await else { return };
        let now = now_secs();
        let user = unique_user();
        let cred = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 60);

        store.insert(&cred).await.unwrap();

        assert_eq!(store.get(&cred.id).await.unwrap(), Some(cred.clone()));
        assert_eq!(
            store.find_valid(&cred.token_id, now).await.unwrap(),
            Some(cred.clone())
        );
        // Expired at a later "now"
        assert!(store
            .find_valid(&cred.token_id, now + 61)
            .await
            .unwrap()
            .is_none());

        store.delete_for_user(&user).await.unwrap();
    }

    #[tokio::test]
    async fn test_revoke_applies_once() {
        let Some(store) = test_store().await else { return };
        let now = now_secs();
        let user = unique_user();
        let cred = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 60);
        store.insert(&cred).await.unwrap();

        assert!(store.revoke(&cred.token_id).await.unwrap());
        assert!(!store.revoke(&cred.token_id).await.unwrap());
        assert!(store.find_valid(&cred.token_id, now).await.unwrap().is_none());

        // Revoked rows are kept, not deleted
        let kept = store.get(&cred.id).await.unwrap().unwrap();
        assert!(kept.revoked);

        store.delete_for_user(&user).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_and_delete_for_user() {
        let Some(store) = test_store().await else { return };
        let now = now_secs();
        let user = unique_user();
        let a = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 60);
        let b = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 60);
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        assert!(store.delete(&a.token_id).await.unwrap());
        assert!(!store.delete(&a.token_id).await.unwrap());
        assert!(store.get(&a.id).await.unwrap().is_none());

        assert_eq!(store.delete_for_user(&user).await.unwrap(), 1);
        assert!(store.active_for_user(&user, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_for_user_leaves_single_row() {
        let Some(store) = test_store().await else { return };
        let now = now_secs();
        let user = unique_user();
        let a = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 60);
        let b = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 60);
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        let next = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 60);
        assert_eq!(store.replace_for_user(&next).await.unwrap(), 2);
        assert!(store.get(&a.id).await.unwrap().is_none());
        assert_eq!(
            store.active_for_user(&user, now).await.unwrap(),
            vec![next.clone()]
        );

        // Overlapping replacements still leave exactly one row
        let c = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 60);
        let d = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 60);
        let (rc, rd) = tokio::join!(store.replace_for_user(&c), store.replace_for_user(&d));
        rc.unwrap();
        rd.unwrap();
        assert_eq!(store.active_for_user(&user, now).await.unwrap().len(), 1);

        store.delete_for_user(&user).await.unwrap();
    }

    #[tokio::test]
    async fn test_rotate_consumes_old_row() {
        let Some(store) = test_store().await else { return };
        let now = now_secs();
        let user = unique_user();
        let old = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 60);
        store.insert(&old).await.unwrap();

        let next = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 120);
        assert!(store.rotate(&old.token_id, &next, now).await.unwrap());

        let active = store.active_for_user(&user, now).await.unwrap();
        assert_eq!(active, vec![next.clone()]);

        // Second rotation from the same old row must fail and write nothing
        let other = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 120);
        assert!(!store.rotate(&old.token_id, &other, now).await.unwrap());
        assert!(store.get(&other.id).await.unwrap().is_none());

        store.delete_for_user(&user).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_rotation_single_winner() {
        let Some(store) = test_store().await else { return };
        let now = now_secs();
        let user = unique_user();
        let old = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 60);
        store.insert(&old).await.unwrap();

        let a = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 120);
        let b = RenewalCredential::new(&user, &nanoid::nanoid!(), now + 120);
        let (ra, rb) = tokio::join!(
            store.rotate(&old.token_id, &a, now),
            store.rotate(&old.token_id, &b, now)
        );
        assert!(ra.unwrap() ^ rb.unwrap());
        assert_eq!(store.active_for_user(&user, now).await.unwrap().len(), 1);

        store.delete_for_user(&user).await.unwrap();
    }
}
