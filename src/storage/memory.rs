//! In-memory store implementations.
//!
//! Each store keeps its state behind a single mutex, so every trait method is
//! one critical section and `rotate` is atomic with respect to other callers.

use super::{normalize_email, CredentialStore, StoreError, UserDirectory};
use crate::models::{RenewalCredential, User};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// [`CredentialStore`] backed by a `HashMap` keyed by token id.
#[derive(Default)]
pub struct MemoryCredentialStore {
    rows: Mutex<HashMap<String, RenewalCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows held, including revoked and expired ones.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, credential: &RenewalCredential) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        if rows.contains_key(&credential.token_id) {
            return Err(StoreError::Duplicate(credential.token_id.clone()));
        }
        rows.insert(credential.token_id.clone(), credential.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<RenewalCredential>, StoreError> {
        Ok(self.rows.lock().values().find(|c| c.id == id).cloned())
    }

    async fn find_valid(
        &self,
        token_id: &str,
        now: u64,
    ) -> Result<Option<RenewalCredential>, StoreError> {
        Ok(self
            .rows
            .lock()
            .get(token_id)
            .filter(|c| c.is_active(now))
            .cloned())
    }

    async fn revoke(&self, token_id: &str) -> Result<bool, StoreError> {
        match self.rows.lock().get_mut(token_id) {
            Some(row) if !row.revoked => {
                row.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, token_id: &str) -> Result<bool, StoreError> {
        Ok(self.rows.lock().remove(token_id).is_some())
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|_, c| c.user_id != user_id);
        Ok((before - rows.len()) as u64)
    }

    async fn replace_for_user(&self, credential: &RenewalCredential) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|_, c| c.user_id != credential.user_id);
        let removed = (before - rows.len()) as u64;

        if rows.contains_key(&credential.token_id) {
            return Err(StoreError::Duplicate(credential.token_id.clone()));
        }
        rows.insert(credential.token_id.clone(), credential.clone());
        Ok(removed)
    }

    async fn active_for_user(
        &self,
        user_id: &str,
        now: u64,
    ) -> Result<Vec<RenewalCredential>, StoreError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|c| c.user_id == user_id && c.is_active(now))
            .cloned()
            .collect())
    }

    async fn rotate(
        &self,
        old_token_id: &str,
        next: &RenewalCredential,
        now: u64,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock();

        match rows.get(old_token_id) {
            Some(old) if old.is_active(now) && old.user_id == next.user_id => {}
            _ => return Ok(false),
        }
        if rows.contains_key(&next.token_id) {
            return Err(StoreError::Duplicate(next.token_id.clone()));
        }

        rows.insert(next.token_id.clone(), next.clone());
        if let Some(old) = rows.get_mut(old_token_id) {
            old.revoked = true;
        }
        Ok(true)
    }
}

/// [`UserDirectory`] backed by a `HashMap` keyed by user id.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        Ok(self
            .users
            .lock()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().get(id).cloned())
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.lock();
        let email = normalize_email(&user.email);
        if users.values().any(|u| u.email == email) {
            return Err(StoreError::Duplicate(email));
        }
        let mut user = user.clone();
        user.email = email;
        users.insert(user.id.clone(), user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_secs;
    use std::sync::Arc;

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            username: id.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            is_admin: false,
        }
    }

    #[tokio::test]
    async fn test_find_valid_filters_revoked_and_expired() {
        let store = MemoryCredentialStore::new();
        let now = now_secs();
        let live = RenewalCredential::new("u1", "live", now + 60);
        let expired = RenewalCredential::new("u1", "expired", now - 1);
        store.insert(&live).await.unwrap();
        store.insert(&expired).await.unwrap();

        assert!(store.find_valid("live", now).await.unwrap().is_some());
        assert!(store.find_valid("expired", now).await.unwrap().is_none());
        assert!(store.find_valid("missing", now).await.unwrap().is_none());

        assert!(store.revoke("live").await.unwrap());
        assert!(!store.revoke("live").await.unwrap());
        assert!(store.find_valid("live", now).await.unwrap().is_none());

        // Lookup by credential id still sees the revoked row
        assert!(store.get(&live.id).await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_duplicate_token_id_rejected() {
        let store = MemoryCredentialStore::new();
        let cred = RenewalCredential::new("u1", "jti", now_secs() + 60);
        store.insert(&cred).await.unwrap();
        assert!(matches!(
            store.insert(&cred).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_for_user_leaves_others() {
        let store = MemoryCredentialStore::new();
        let exp = now_secs() + 60;
        store
            .insert(&RenewalCredential::new("u1", "a", exp))
            .await
            .unwrap();
        store
            .insert(&RenewalCredential::new("u1", "b", exp))
            .await
            .unwrap();
        store
            .insert(&RenewalCredential::new("u2", "c", exp))
            .await
            .unwrap();

        assert_eq!(store.delete_for_user("u1").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.delete("c").await.unwrap());
        assert!(!store.delete("c").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_replace_for_user_keeps_only_new_row() {
        let store = MemoryCredentialStore::new();
        let exp = now_secs() + 60;
        store
            .insert(&RenewalCredential::new("u1", "a", exp))
            .await
            .unwrap();
        store
            .insert(&RenewalCredential::new("u1", "b", exp))
            .await
            .unwrap();
        store
            .insert(&RenewalCredential::new("u2", "c", exp))
            .await
            .unwrap();

        let next = RenewalCredential::new("u1", "d", exp);
        assert_eq!(store.replace_for_user(&next).await.unwrap(), 2);

        let active = store.active_for_user("u1", now_secs()).await.unwrap();
        assert_eq!(active, vec![next]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_rotate_rejects_foreign_owner() {
        let store = MemoryCredentialStore::new();
        let now = now_secs();
        store
            .insert(&RenewalCredential::new("u1", "old", now + 60))
            .await
            .unwrap();

        let hijack = RenewalCredential::new("u2", "new", now + 60);
        assert!(!store.rotate("old", &hijack, now).await.unwrap());
        assert!(store.find_valid("old", now).await.unwrap().is_some());
        assert!(store.find_valid("new", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_rotation_single_winner() {
        let store = Arc::new(MemoryCredentialStore::new());
        let now = now_secs();
        store
            .insert(&RenewalCredential::new("u1", "old", now + 60))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let next = RenewalCredential::new("u1", &format!("next-{}", i), now + 60);
                store.rotate("old", &next, now).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.active_for_user("u1", now).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_user_directory_email_lookup() {
        let users = MemoryUserDirectory::new();
        users.insert(&user("u1", "Alice@Example.com")).await.unwrap();

        let found = users.find_by_email("alice@example.com").await.unwrap();
        assert_eq!(found.unwrap().id, "u1");
        assert!(users.find_by_email("bob@example.com").await.unwrap().is_none());
        assert!(users.find_by_id("u1").await.unwrap().is_some());

        assert!(matches!(
            users.insert(&user("u2", "ALICE@example.com")).await,
            Err(StoreError::Duplicate(_))
        ));
    }
}
