//! Persistence seams for users and refresh tokens.
//!
//! The engine only talks to these traits. `postgres` backs them in production,
//! `memory` backs them in tests and local runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use uuid::Uuid;

use crate::auth::models::{NewUser, RefreshTokenRecord, User};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryRefreshTokenStore, MemoryUserStore};
pub use postgres::{PgRefreshTokenStore, PgUserStore};

/// Outcome of inserting a user when email or username may already be taken.
#[derive(Debug)]
pub enum InsertOutcome {
    Created(User),
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    Conflict,
    NotFound,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<InsertOutcome>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// `email` must already be normalized.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// All users, oldest first, without buffering the whole table.
    fn stream_all(&self) -> BoxStream<'_, Result<User>>;

    /// Persist username, email, password hash and `updated_at`.
    async fn update_profile(&self, user: &User) -> Result<UpdateOutcome>;

    /// Returns `false` when no row matched.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn increment_failed_logins(&self, email: &str) -> Result<()>;

    /// Clears both the counter and any lock deadline.
    async fn reset_failed_logins(&self, email: &str) -> Result<()>;

    async fn lock_until(&self, email: &str, until: DateTime<Utc>) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, token: &RefreshTokenRecord) -> Result<()>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>>;

    /// Marks the row revoked. Returns `false` when no row matched.
    async fn revoke(&self, token_hash: &str) -> Result<bool>;
}
