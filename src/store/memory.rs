use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CredentialStore, UserRecord};
use crate::error::StoreError;

/// Process-local store. Every method takes the lock exactly once, so each
/// write is atomic with respect to every other call.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(identity: &str) -> StoreError {
    StoreError::NotFound(format!("user {}", identity))
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_identity(&self, identity: &str) -> Result<UserRecord, StoreError> {
        self.users
            .read()
            .await
            .get(identity)
            .cloned()
            .ok_or_else(|| not_found(identity))
    }

    async fn list(&self) -> Result<Vec<UserRecord>, StoreError> {
        let mut users: Vec<UserRecord> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.identity.cmp(&b.identity)));
        Ok(users)
    }

    async fn insert(&self, record: &UserRecord) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&record.identity) {
            return Err(StoreError::Duplicate(format!("user {}", record.identity)));
        }
        users.insert(record.identity.clone(), record.clone());
        Ok(())
    }

    async fn save(&self, record: &UserRecord) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(&record.identity)
            .ok_or_else(|| not_found(&record.identity))?;
        stored.role = record.role;
        stored.password_hash = record.password_hash.clone();
        stored.updated_at = record.updated_at;
        Ok(())
    }

    async fn set_refresh_token(
        &self,
        identity: &str,
        token: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let stored = users.get_mut(identity).ok_or_else(|| not_found(identity))?;
        stored.refresh_token = token.map(str::to_owned);
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        identity: &str,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        let stored = users.get_mut(identity).ok_or_else(|| not_found(identity))?;
        if stored.refresh_token.as_deref() != Some(current) {
            return Ok(false);
        }
        stored.refresh_token = Some(next.to_owned());
        Ok(true)
    }

    async fn delete(&self, identity: &str) -> Result<(), StoreError> {
        self.users
            .write()
            .await
            .remove(identity)
            .map(|_| ())
            .ok_or_else(|| not_found(identity))
    }
}
