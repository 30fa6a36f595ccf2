//! In-process stores with the same contracts as the Postgres adapters.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{
    StreamExt,
    stream::{self, BoxStream},
};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{InsertOutcome, RefreshTokenStore, UpdateOutcome, UserStore};
use crate::auth::models::{NewUser, RefreshTokenRecord, User};

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite roles directly; there is no public operation that grants roles.
    pub async fn set_roles(&self, id: Uuid, roles: Vec<String>) -> bool {
        match self.users.write().await.get_mut(&id) {
            Some(user) => {
                user.roles = roles;
                true
            }
            None => false,
        }
    }
}

fn taken(users: &HashMap<Uuid, User>, except: Option<Uuid>, email: &str, username: &str) -> bool {
    users.values().any(|user| {
        Some(user.id) != except && (user.email == email || user.username == username)
    })
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<InsertOutcome> {
        let mut users = self.users.write().await;
        if taken(&users, None, &user.email, &user.username) {
            return Ok(InsertOutcome::Conflict);
        }
        let stored = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            roles: user.roles,
            created_at: user.created_at,
            updated_at: user.updated_at,
            failed_login_attempts: 0,
            locked_until: None,
        };
        users.insert(stored.id, stored.clone());
        Ok(InsertOutcome::Created(stored))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.username == username).cloned())
    }

    fn stream_all(&self) -> BoxStream<'_, Result<User>> {
        stream::once(async move {
            let mut snapshot: Vec<User> = self.users.read().await.values().cloned().collect();
            snapshot.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            stream::iter(snapshot.into_iter().map(Ok))
        })
        .flatten()
        .boxed()
    }

    async fn update_profile(&self, user: &User) -> Result<UpdateOutcome> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Ok(UpdateOutcome::NotFound);
        }
        if taken(&users, Some(user.id), &user.email, &user.username) {
            return Ok(UpdateOutcome::Conflict);
        }
        let Some(stored) = users.get_mut(&user.id) else {
            return Ok(UpdateOutcome::NotFound);
        };
        stored.username.clone_from(&user.username);
        stored.email.clone_from(&user.email);
        stored.password_hash.clone_from(&user.password_hash);
        stored.updated_at = user.updated_at;
        Ok(UpdateOutcome::Updated)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }

    async fn increment_failed_logins(&self, email: &str) -> Result<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.values_mut().find(|user| user.email == email) {
            user.failed_login_attempts += 1;
        }
        Ok(())
    }

    async fn reset_failed_logins(&self, email: &str) -> Result<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.values_mut().find(|user| user.email == email) {
            user.failed_login_attempts = 0;
            user.locked_until = None;
        }
        Ok(())
    }

    async fn lock_until(&self, email: &str, until: DateTime<Utc>) -> Result<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.values_mut().find(|user| user.email == email) {
            user.locked_until = Some(until);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRefreshTokenStore {
    tokens: RwLock<HashMap<String, RefreshTokenRecord>>,
    fail_revocations: AtomicBool,
}

impl MemoryRefreshTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `revoke` call fail, to exercise best-effort revocation.
    pub fn fail_revocations(&self, fail: bool) {
        self.fail_revocations.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn insert(&self, token: &RefreshTokenRecord) -> Result<()> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.token_hash) {
            return Err(anyhow!("refresh token hash already stored"));
        }
        tokens.insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>> {
        Ok(self.tokens.read().await.get(token_hash).cloned())
    }

    async fn revoke(&self, token_hash: &str) -> Result<bool> {
        if self.fail_revocations.load(Ordering::SeqCst) {
            return Err(anyhow!("refresh token store unavailable"));
        }
        match self.tokens.write().await.get_mut(token_hash) {
            Some(token) => {
                token.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use futures_util::TryStreamExt;

    fn new_user(name: &str, email: &str) -> NewUser {
        let now = Utc::now();
        NewUser {
            username: name.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            roles: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn created(store: &MemoryUserStore, name: &str, email: &str) -> Result<User> {
        match store.insert(new_user(name, email)).await? {
            InsertOutcome::Created(user) => Ok(user),
            InsertOutcome::Conflict => Err(anyhow!("unexpected conflict")),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() -> Result<()> {
        let store = MemoryUserStore::new();
        created(&store, "Ann", "ann@x.io").await?;
        assert!(matches!(
            store.insert(new_user("Bob", "ann@x.io")).await?,
            InsertOutcome::Conflict
        ));
        assert!(matches!(
            store.insert(new_user("Ann", "bob@x.io")).await?,
            InsertOutcome::Conflict
        ));
        Ok(())
    }

    #[tokio::test]
    async fn update_allows_keeping_own_values() -> Result<()> {
        let store = MemoryUserStore::new();
        let mut ann = created(&store, "Ann", "ann@x.io").await?;
        created(&store, "Bob", "bob@x.io").await?;

        ann.password_hash = "rehashed".to_string();
        assert_eq!(store.update_profile(&ann).await?, UpdateOutcome::Updated);

        ann.email = "bob@x.io".to_string();
        assert_eq!(store.update_profile(&ann).await?, UpdateOutcome::Conflict);

        ann.id = Uuid::new_v4();
        assert_eq!(store.update_profile(&ann).await?, UpdateOutcome::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn lockout_fields() -> Result<()> {
        let store = MemoryUserStore::new();
        created(&store, "Ann", "ann@x.io").await?;
        store.increment_failed_logins("ann@x.io").await?;
        store.increment_failed_logins("ann@x.io").await?;
        let until = Utc::now() + TimeDelta::minutes(15);
        store.lock_until("ann@x.io", until).await?;

        let user = store.find_by_email("ann@x.io").await?;
        assert_eq!(user.as_ref().map(|u| u.failed_login_attempts), Some(2));
        assert_eq!(user.and_then(|u| u.locked_until), Some(until));

        store.reset_failed_logins("ann@x.io").await?;
        let user = store.find_by_email("ann@x.io").await?;
        assert_eq!(user.as_ref().map(|u| u.failed_login_attempts), Some(0));
        assert_eq!(user.and_then(|u| u.locked_until), None);
        Ok(())
    }

    #[tokio::test]
    async fn stream_yields_every_user() -> Result<()> {
        let store = MemoryUserStore::new();
        created(&store, "Ann", "ann@x.io").await?;
        created(&store, "Bob", "bob@x.io").await?;
        let users: Vec<User> = store.stream_all().try_collect().await?;
        assert_eq!(users.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn revoke_marks_rows() -> Result<()> {
        let store = MemoryRefreshTokenStore::new();
        let now = Utc::now();
        let record = RefreshTokenRecord {
            user_id: Uuid::new_v4(),
            token_hash: "abc".to_string(),
            expires_at: now + TimeDelta::days(7),
            created_at: now,
            revoked: false,
        };
        store.insert(&record).await?;
        assert!(store.insert(&record).await.is_err());
        assert!(store.revoke("abc").await?);
        assert!(!store.revoke("missing").await?);
        assert_eq!(
            store.find_by_hash("abc").await?.map(|t| t.revoked),
            Some(true)
        );

        store.fail_revocations(true);
        assert!(store.revoke("abc").await.is_err());
        Ok(())
    }
}
