//! Credential and session orchestration.
//!
//! Flow Overview:
//! 1) Sign-up validates, checks uniqueness, hashes and stores, then opens a session.
//! 2) Sign-in consults the lock, verifies the password and records the outcome.
//! 3) Refresh rotates the opaque secret: the old row is revoked, a new one stored.
//! 4) User management reads and edits accounts by id.
//!
//! Side effects that only support security bookkeeping (failure counters,
//! lock deadlines, revocations) are logged on failure and never fail the
//! request that triggered them.

use anyhow::Result;
use futures_util::{StreamExt, stream::BoxStream};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    clock::Clock,
    config::AuthConfig,
    error::{AuthError, DuplicateField},
    lockout::{LockState, LockoutPolicy},
    models::{
        NewUser, PublicUser, RefreshTokenRecord, RotatedTokens, Session, SignInRequest,
        SignUpRequest, User, UserUpdate,
    },
    password,
    tokens::{SigningKey, TokenIssuer, TokenPayload, generate_refresh_token, hash_refresh_token},
    validators::{normalize_email, parse_user_id, sanitize_name, validate_sign_up, validate_update},
};
use crate::storage::{InsertOutcome, RefreshTokenStore, UpdateOutcome, UserStore};

pub struct AuthService {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    issuer: TokenIssuer,
    lockout: LockoutPolicy,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        key: SigningKey,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            issuer: TokenIssuer::new(key, config.access_token_ttl(), clock.clone()),
            lockout: config.lockout_policy(),
            config,
            clock,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Verify a bearer access token.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidToken` when verification fails.
    pub fn authenticate(&self, access_token: &str) -> Result<TokenPayload, AuthError> {
        self.issuer.decode_access_token(access_token)
    }

    /// # Errors
    /// Returns `AuthError::Internal` when the user store is unreachable.
    pub async fn ping(&self) -> Result<(), AuthError> {
        self.users.ping().await.map_err(|err| {
            error!("user store ping failed: {err:#}");
            AuthError::Internal("database unavailable")
        })
    }

    /// Register a new account and open its first session.
    ///
    /// # Errors
    /// Returns validation, duplicate or internal errors.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<Session, AuthError> {
        let email = normalize_email(&request.email);
        info!("[SECURITY] sign-up attempt for {email}");

        validate_sign_up(&request)?;
        let username = sanitize_name(&request.name);
        self.ensure_unique(None, &email, &username).await?;

        let password_hash = password::hash(request.password).await.map_err(|err| {
            error!("failed to hash password: {err:#}");
            AuthError::Internal("failed to create user")
        })?;

        let now = self.clock.now();
        let outcome = self
            .users
            .insert(NewUser {
                username,
                email: email.clone(),
                password_hash,
                roles: Vec::new(),
                created_at: now,
                updated_at: now,
            })
            .await
            .map_err(|err| {
                error!("failed to insert user: {err:#}");
                AuthError::Internal("failed to create user")
            })?;

        let user = match outcome {
            InsertOutcome::Created(user) => user,
            InsertOutcome::Conflict => {
                warn!("[SECURITY] sign-up lost a uniqueness race for {email}");
                return Err(AuthError::DuplicateUser(DuplicateField::EmailOrUsername));
            }
        };

        let session = self.open_session(&user).await?;
        info!("[SECURITY] user {} signed up", user.id);
        Ok(session)
    }

    /// Authenticate by email and password.
    ///
    /// # Errors
    /// Returns `InvalidCredentials`, `AccountLocked` or `Internal`.
    pub async fn sign_in(&self, request: SignInRequest) -> Result<Session, AuthError> {
        let email = normalize_email(&request.email);
        info!("[SECURITY] sign-in attempt for {email}");

        let user = self.users.find_by_email(&email).await.map_err(|err| {
            error!("failed to load user for sign-in: {err:#}");
            AuthError::internal()
        })?;
        let Some(user) = user else {
            warn!("[SECURITY] sign-in for unknown email {email}");
            return Err(AuthError::InvalidCredentials);
        };

        if let LockState::Locked { until } = self.lockout.state(user.locked_until, self.clock.now())
        {
            warn!("[SECURITY] sign-in refused for locked account {email} until {until}");
            return Err(AuthError::AccountLocked);
        }

        if !password::verify(user.password_hash.clone(), request.password).await {
            warn!("[SECURITY] wrong password for {email}");
            self.record_failed_sign_in(&email).await;
            return Err(AuthError::InvalidCredentials);
        }

        if let Err(err) = self.users.reset_failed_logins(&email).await {
            error!("failed to reset failed login counter for {email}: {err:#}");
        }

        let session = self.open_session(&user).await?;
        info!("[SECURITY] user {} signed in", user.id);
        Ok(session)
    }

    /// Exchange a refresh secret for a new access token and a new secret.
    ///
    /// # Errors
    /// Returns `InvalidRefreshToken` for unknown, revoked or expired secrets.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RotatedTokens, AuthError> {
        let token_hash = hash_refresh_token(refresh_token);

        let stored = self
            .refresh_tokens
            .find_by_hash(&token_hash)
            .await
            .map_err(|err| {
                error!("failed to load refresh token: {err:#}");
                AuthError::internal()
            })?;
        let stored = match stored {
            Some(stored) if stored.is_active(self.clock.now()) => stored,
            Some(stored) => {
                warn!(
                    "[SECURITY] inactive refresh token presented for user {} (revoked: {})",
                    stored.user_id, stored.revoked
                );
                return Err(AuthError::InvalidRefreshToken);
            }
            None => {
                warn!("[SECURITY] unknown refresh token presented");
                return Err(AuthError::InvalidRefreshToken);
            }
        };

        let user = self
            .users
            .find_by_id(stored.user_id)
            .await
            .map_err(|err| {
                error!("failed to load refresh token owner: {err:#}");
                AuthError::internal()
            })?
            .ok_or_else(|| {
                warn!("[SECURITY] refresh token owner {} no longer exists", stored.user_id);
                AuthError::InvalidRefreshToken
            })?;

        let access_token = self.issue_access_token(&user)?;

        if let Err(err) = self.refresh_tokens.revoke(&token_hash).await {
            error!("failed to revoke refresh token for user {}: {err:#}", user.id);
        }

        let refresh_token = self.store_refresh_token(user.id).await?;
        info!("[SECURITY] refresh token rotated for user {}", user.id);

        Ok(RotatedTokens {
            access_token,
            refresh_token,
        })
    }

    /// Revoke a refresh secret. Unknown secrets and store failures are ignored.
    pub async fn revoke_refresh_token(&self, refresh_token: &str) {
        if refresh_token.is_empty() {
            return;
        }
        match self.refresh_tokens.revoke(&hash_refresh_token(refresh_token)).await {
            Ok(true) => info!("[SECURITY] refresh token revoked"),
            Ok(false) => {}
            Err(err) => error!("failed to revoke refresh token: {err:#}"),
        }
    }

    /// # Errors
    /// Returns `InvalidIdentifier`, `NotFound` or `Internal`.
    pub async fn get_user(&self, id: &str) -> Result<PublicUser, AuthError> {
        let user_id = parse_user_id(id)?;
        self.load_user(user_id).await.map(|user| user.to_public())
    }

    /// Stream every user's public view, oldest first.
    pub fn list_users(&self) -> BoxStream<'_, Result<PublicUser, AuthError>> {
        self.users
            .stream_all()
            .map(|row| {
                row.map(|user| user.to_public()).map_err(|err| {
                    error!("failed to list users: {err:#}");
                    AuthError::Internal("failed to list users")
                })
            })
            .boxed()
    }

    /// Apply the supplied fields of `update` to an existing user.
    ///
    /// # Errors
    /// Returns validation, `NotFound`, duplicate or internal errors.
    pub async fn update_user(&self, update: UserUpdate) -> Result<PublicUser, AuthError> {
        validate_update(&update)?;
        let user_id = parse_user_id(&update.id)?;
        let mut user = self.load_user(user_id).await?;

        if let Some(password) = update.password() {
            user.password_hash = password::hash(password.to_string())
                .await
                .map_err(|err| {
                    error!("failed to hash password: {err:#}");
                    AuthError::Internal("failed to update user")
                })?;
        }
        if let Some(name) = update.name() {
            user.username = sanitize_name(name);
        }
        if let Some(email) = update.email() {
            user.email = normalize_email(email);
        }
        user.updated_at = self.clock.now();

        self.ensure_unique(Some(user.id), &user.email, &user.username)
            .await?;

        let outcome = self.users.update_profile(&user).await.map_err(|err| {
            error!("failed to update user {user_id}: {err:#}");
            AuthError::Internal("failed to update user")
        })?;

        match outcome {
            UpdateOutcome::Updated => {
                info!("[SECURITY] user {user_id} updated");
                Ok(user.to_public())
            }
            UpdateOutcome::Conflict => Err(AuthError::DuplicateUser(
                DuplicateField::EmailOrUsername,
            )),
            UpdateOutcome::NotFound => Err(AuthError::NotFound(user_id.to_string())),
        }
    }

    /// # Errors
    /// Returns `InvalidIdentifier`, `NotFound` or `Internal`.
    pub async fn delete_user(&self, id: &str) -> Result<(), AuthError> {
        let user_id = parse_user_id(id)?;
        let deleted = self.users.delete(user_id).await.map_err(|err| {
            error!("failed to delete user {user_id}: {err:#}");
            AuthError::Internal("failed to delete user")
        })?;

        if deleted {
            info!("[SECURITY] user {user_id} deleted");
            Ok(())
        } else {
            Err(AuthError::NotFound(user_id.to_string()))
        }
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await
            .map_err(|err| {
                error!("failed to load user {user_id}: {err:#}");
                AuthError::Internal("failed to load user")
            })?
            .ok_or_else(|| AuthError::NotFound(user_id.to_string()))
    }

    /// Reject when another account already holds `email` or `username`.
    async fn ensure_unique(
        &self,
        except: Option<Uuid>,
        email: &str,
        username: &str,
    ) -> Result<(), AuthError> {
        let lookup_failed = |err: anyhow::Error| {
            error!("failed to check user uniqueness: {err:#}");
            AuthError::internal()
        };
        let is_other = |user: &User| Some(user.id) != except;

        let by_email = self.users.find_by_email(email).await.map_err(lookup_failed)?;
        if by_email.as_ref().is_some_and(is_other) {
            return Err(AuthError::DuplicateUser(DuplicateField::Email));
        }

        let by_username = self
            .users
            .find_by_username(username)
            .await
            .map_err(lookup_failed)?;
        if by_username.as_ref().is_some_and(is_other) {
            return Err(AuthError::DuplicateUser(DuplicateField::Username));
        }

        Ok(())
    }

    async fn record_failed_sign_in(&self, email: &str) {
        if let Err(err) = self.users.increment_failed_logins(email).await {
            error!("failed to increment failed logins for {email}: {err:#}");
            return;
        }

        let attempts = match self.users.find_by_email(email).await {
            Ok(Some(user)) => user.failed_login_attempts,
            Ok(None) => return,
            Err(err) => {
                error!("failed to reload user after failed sign-in: {err:#}");
                return;
            }
        };

        if let Some(until) = self.lockout.lock_after_failure(attempts, self.clock.now()) {
            match self.users.lock_until(email, until).await {
                Ok(()) => warn!(
                    "[SECURITY] account {email} locked until {until} after {attempts} failed attempts"
                ),
                Err(err) => error!("failed to lock account {email}: {err:#}"),
            }
        }
    }

    fn issue_access_token(&self, user: &User) -> Result<String, AuthError> {
        self.issuer
            .issue_access_token(&user.id.to_string(), &user.roles)
            .map_err(|err| {
                error!("failed to issue access token: {err:#}");
                AuthError::internal()
            })
    }

    async fn store_refresh_token(&self, user_id: Uuid) -> Result<String, AuthError> {
        let secret = generate_refresh_token().map_err(|err| {
            error!("{err:#}");
            AuthError::internal()
        })?;
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.config.refresh_token_ttl())
            .ok_or_else(|| {
                error!("refresh token lifetime overflows the calendar");
                AuthError::internal()
            })?;
        let record = RefreshTokenRecord {
            user_id,
            token_hash: hash_refresh_token(&secret),
            expires_at,
            created_at: now,
            revoked: false,
        };

        self.refresh_tokens.insert(&record).await.map_err(|err| {
            error!("failed to store refresh token: {err:#}");
            AuthError::internal()
        })?;

        Ok(secret)
    }

    async fn open_session(&self, user: &User) -> Result<Session, AuthError> {
        let access_token = self.issue_access_token(user)?;
        let refresh_token = self.store_refresh_token(user.id).await?;
        Ok(Session {
            user: user.to_public(),
            access_token,
            refresh_token,
        })
    }
}
