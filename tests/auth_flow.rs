//! End-to-end flows through `AuthService` over the in-memory stores.
//!
//! Time is driven by a `ManualClock` so token expiry and lockout windows can be
//! crossed without sleeping.

use anyhow::Result;
use assetra::{
    auth::{
        AuthConfig, AuthError, AuthService, DuplicateField, ManualClock, SignInRequest,
        SignUpRequest, SigningKey, UserUpdate, ValidationError,
    },
    storage::{MemoryRefreshTokenStore, MemoryUserStore, RefreshTokenStore, UserStore},
};
use chrono::{TimeDelta, Utc};
use futures_util::TryStreamExt;
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const SECRET: &str = "integration-secret-integration-secret";

struct Harness {
    service: AuthService,
    users: Arc<MemoryUserStore>,
    tokens: Arc<MemoryRefreshTokenStore>,
    clock: Arc<ManualClock>,
}

fn harness() -> Result<Harness> {
    harness_with(AuthConfig::new())
}

fn harness_with(config: AuthConfig) -> Result<Harness> {
    let users = Arc::new(MemoryUserStore::new());
    let tokens = Arc::new(MemoryRefreshTokenStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let service = AuthService::new(
        users.clone(),
        tokens.clone(),
        SigningKey::new(&SecretString::from(SECRET))?,
        config,
        clock.clone(),
    );
    Ok(Harness {
        service,
        users,
        tokens,
        clock,
    })
}

fn sign_up(name: &str, email: &str) -> SignUpRequest {
    SignUpRequest {
        name: name.to_string(),
        email: email.to_string(),
        password: "Passw0rd!".to_string(),
    }
}

fn sign_in(email: &str, password: &str) -> SignInRequest {
    SignInRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn sign_up_opens_a_session() -> Result<()> {
    let h = harness()?;
    let session = h.service.sign_up(sign_up("Ann", "ANN@x.io")).await?;

    assert_eq!(session.user.email, "ann@x.io");
    assert_eq!(session.user.name, "Ann");
    assert!(session.user.roles.is_empty());
    assert_eq!(session.refresh_token.len(), 64);

    let payload = h.service.authenticate(&session.access_token)?;
    assert_eq!(payload.user_id, session.user.id);
    assert_eq!(h.tokens.len().await, 1);

    let stored = h.users.find_by_email("ann@x.io").await?;
    let hash = stored.map(|u| u.password_hash).unwrap_or_default();
    assert!(hash.starts_with("$argon2id$"));
    Ok(())
}

#[tokio::test]
async fn sign_up_rejects_duplicates() -> Result<()> {
    let h = harness()?;
    h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;

    let err = h.service.sign_up(sign_up("Other", "Ann@X.io")).await.err();
    assert!(matches!(
        err,
        Some(AuthError::DuplicateUser(DuplicateField::Email))
    ));

    let err = h.service.sign_up(sign_up("Ann", "bob@x.io")).await.err();
    assert!(matches!(
        err,
        Some(AuthError::DuplicateUser(DuplicateField::Username))
    ));
    Ok(())
}

#[tokio::test]
async fn sign_up_validates_before_touching_stores() -> Result<()> {
    let h = harness()?;
    let mut request = sign_up("Ann", "ann@x.io");
    request.password = "alllowercase1!".to_string();

    let err = h.service.sign_up(request).await.err();
    assert!(matches!(
        err,
        Some(AuthError::Validation(ValidationError::WeakPassword))
    ));

    let err = h.service.sign_up(sign_up("<b>", "ann@x.io")).await.err();
    assert!(matches!(
        err,
        Some(AuthError::Validation(ValidationError::NameInvalidCharacters))
    ));
    assert!(h.tokens.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn sign_in_with_correct_password() -> Result<()> {
    let h = harness()?;
    let created = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;

    let session = h.service.sign_in(sign_in(" Ann@X.io ", "Passw0rd!")).await?;
    assert_eq!(session.user.id, created.user.id);
    assert_ne!(session.refresh_token, created.refresh_token);
    assert_eq!(h.tokens.len().await, 2);
    Ok(())
}

#[tokio::test]
async fn unknown_email_is_invalid_credentials() -> Result<()> {
    let h = harness()?;
    let err = h.service.sign_in(sign_in("ghost@x.io", "Passw0rd!")).await.err();
    assert!(matches!(err, Some(AuthError::InvalidCredentials)));
    Ok(())
}

#[tokio::test]
async fn three_failures_lock_the_account() -> Result<()> {
    let h = harness()?;
    h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;

    for _ in 0..3 {
        let err = h.service.sign_in(sign_in("ann@x.io", "Wrong-pass1")).await.err();
        assert!(matches!(err, Some(AuthError::InvalidCredentials)));
    }

    let err = h.service.sign_in(sign_in("ann@x.io", "Passw0rd!")).await.err();
    assert!(matches!(err, Some(AuthError::AccountLocked)));

    let user = h.users.find_by_email("ann@x.io").await?;
    assert_eq!(user.as_ref().map(|u| u.failed_login_attempts), Some(3));
    assert!(user.and_then(|u| u.locked_until).is_some());
    Ok(())
}

#[tokio::test]
async fn lock_expires_and_success_resets_the_counter() -> Result<()> {
    let h = harness()?;
    h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;
    for _ in 0..3 {
        let _ = h.service.sign_in(sign_in("ann@x.io", "Wrong-pass1")).await;
    }

    h.clock.advance(TimeDelta::minutes(16));
    h.service.sign_in(sign_in("ann@x.io", "Passw0rd!")).await?;

    let user = h.users.find_by_email("ann@x.io").await?;
    assert_eq!(user.as_ref().map(|u| u.failed_login_attempts), Some(0));
    assert_eq!(user.and_then(|u| u.locked_until), None);
    Ok(())
}

#[tokio::test]
async fn failure_after_expired_lock_relocks_immediately() -> Result<()> {
    let h = harness()?;
    h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;
    for _ in 0..3 {
        let _ = h.service.sign_in(sign_in("ann@x.io", "Wrong-pass1")).await;
    }

    h.clock.advance(TimeDelta::minutes(16));
    let err = h.service.sign_in(sign_in("ann@x.io", "Wrong-pass1")).await.err();
    assert!(matches!(err, Some(AuthError::InvalidCredentials)));

    let err = h.service.sign_in(sign_in("ann@x.io", "Passw0rd!")).await.err();
    assert!(matches!(err, Some(AuthError::AccountLocked)));
    Ok(())
}

#[tokio::test]
async fn access_tokens_expire_after_fifteen_minutes() -> Result<()> {
    let h = harness()?;
    let session = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;

    h.clock.advance(TimeDelta::minutes(14));
    assert!(h.service.authenticate(&session.access_token).is_ok());

    h.clock.advance(TimeDelta::minutes(2));
    assert!(matches!(
        h.service.authenticate(&session.access_token),
        Err(AuthError::InvalidToken)
    ));
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_the_secret() -> Result<()> {
    let h = harness()?;
    let session = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;

    let rotated = h.service.refresh_token(&session.refresh_token).await?;
    assert_ne!(rotated.refresh_token, session.refresh_token);
    assert_eq!(
        h.service.authenticate(&rotated.access_token)?.user_id,
        session.user.id
    );

    let err = h.service.refresh_token(&session.refresh_token).await.err();
    assert!(matches!(err, Some(AuthError::InvalidRefreshToken)));

    assert!(h.service.refresh_token(&rotated.refresh_token).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn unknown_and_expired_refresh_tokens_are_rejected() -> Result<()> {
    let h = harness()?;
    let session = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;

    for secret in ["", "deadbeef"] {
        let err = h.service.refresh_token(secret).await.err();
        assert!(matches!(err, Some(AuthError::InvalidRefreshToken)));
    }

    h.clock.advance(TimeDelta::days(7) + TimeDelta::seconds(1));
    let err = h.service.refresh_token(&session.refresh_token).await.err();
    assert!(matches!(err, Some(AuthError::InvalidRefreshToken)));
    Ok(())
}

#[tokio::test]
async fn failed_revocation_does_not_fail_refresh() -> Result<()> {
    let h = harness()?;
    let session = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;

    h.tokens.fail_revocations(true);
    let rotated = h.service.refresh_token(&session.refresh_token).await?;
    assert!(!rotated.refresh_token.is_empty());

    // The old secret stays usable until a revocation lands.
    h.tokens.fail_revocations(false);
    assert!(h.service.refresh_token(&session.refresh_token).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn logout_revocation_is_idempotent() -> Result<()> {
    let h = harness()?;
    let session = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;

    h.service.revoke_refresh_token(&session.refresh_token).await;
    h.service.revoke_refresh_token(&session.refresh_token).await;
    h.service.revoke_refresh_token("never-issued").await;

    let err = h.service.refresh_token(&session.refresh_token).await.err();
    assert!(matches!(err, Some(AuthError::InvalidRefreshToken)));
    Ok(())
}

#[tokio::test]
async fn get_user_by_id() -> Result<()> {
    let h = harness()?;
    let session = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;

    let user = h.service.get_user(&session.user.id).await?;
    assert_eq!(user, session.user);

    let err = h.service.get_user("not-a-uuid").await.err();
    assert!(matches!(
        err,
        Some(AuthError::Validation(ValidationError::InvalidIdentifier))
    ));

    let err = h
        .service
        .get_user("6f1c3a52-6d2e-4a7c-9a43-5b8f0f0c2d11")
        .await
        .err();
    assert!(matches!(err, Some(AuthError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn list_users_streams_public_views() -> Result<()> {
    let h = harness()?;
    h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;
    h.clock.advance(TimeDelta::seconds(1));
    h.service.sign_up(sign_up("Bob", "bob@x.io")).await?;

    let users: Vec<_> = h.service.list_users().try_collect().await?;
    let names: Vec<_> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["Ann", "Bob"]);
    Ok(())
}

#[tokio::test]
async fn update_applies_supplied_fields() -> Result<()> {
    let h = harness()?;
    let session = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;
    h.clock.advance(TimeDelta::seconds(30));

    let updated = h
        .service
        .update_user(UserUpdate {
            id: session.user.id.clone(),
            name: Some("Ann Lee".to_string()),
            email: Some("ANN.LEE@x.io".to_string()),
            password: Some(String::new()),
        })
        .await?;
    assert_eq!(updated.name, "Ann Lee");
    assert_eq!(updated.email, "ann.lee@x.io");
    assert_eq!(updated.updated, session.user.created + 30);

    // Password was left alone.
    h.service.sign_in(sign_in("ann.lee@x.io", "Passw0rd!")).await?;

    h.service
        .update_user(UserUpdate {
            id: session.user.id.clone(),
            password: Some("N3w-Passw0rd".to_string()),
            ..UserUpdate::default()
        })
        .await?;
    h.service.sign_in(sign_in("ann.lee@x.io", "N3w-Passw0rd")).await?;
    Ok(())
}

#[tokio::test]
async fn update_keeps_own_values_but_rejects_others() -> Result<()> {
    let h = harness()?;
    let ann = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;
    h.service.sign_up(sign_up("Bob", "bob@x.io")).await?;

    let same = h
        .service
        .update_user(UserUpdate {
            id: ann.user.id.clone(),
            name: Some("Ann".to_string()),
            email: Some("ann@x.io".to_string()),
            ..UserUpdate::default()
        })
        .await;
    assert!(same.is_ok());

    let err = h
        .service
        .update_user(UserUpdate {
            id: ann.user.id.clone(),
            email: Some("bob@x.io".to_string()),
            ..UserUpdate::default()
        })
        .await
        .err();
    assert!(matches!(
        err,
        Some(AuthError::DuplicateUser(DuplicateField::Email))
    ));
    Ok(())
}

#[tokio::test]
async fn update_error_cases() -> Result<()> {
    let h = harness()?;
    let ann = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;

    let err = h
        .service
        .update_user(UserUpdate {
            id: ann.user.id.clone(),
            ..UserUpdate::default()
        })
        .await
        .err();
    assert!(matches!(
        err,
        Some(AuthError::Validation(ValidationError::NoFieldsProvided))
    ));

    let err = h
        .service
        .update_user(UserUpdate {
            id: "6f1c3a52-6d2e-4a7c-9a43-5b8f0f0c2d11".to_string(),
            name: Some("Zed".to_string()),
            ..UserUpdate::default()
        })
        .await
        .err();
    assert!(matches!(err, Some(AuthError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn delete_removes_the_user() -> Result<()> {
    let h = harness()?;
    let ann = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;

    h.service.delete_user(&ann.user.id).await?;
    assert!(matches!(
        h.service.get_user(&ann.user.id).await.err(),
        Some(AuthError::NotFound(_))
    ));
    assert!(matches!(
        h.service.delete_user(&ann.user.id).await.err(),
        Some(AuthError::NotFound(_))
    ));

    // Refresh rows outlive their owner but can no longer be used.
    let err = h.service.refresh_token(&ann.refresh_token).await.err();
    assert!(matches!(err, Some(AuthError::InvalidRefreshToken)));
    Ok(())
}

#[tokio::test]
async fn oversized_lifetimes_still_open_sessions() -> Result<()> {
    let h = harness_with(
        AuthConfig::new()
            .with_access_token_ttl_seconds(i64::MAX)
            .with_refresh_token_ttl_seconds(1_000_000_000_000_000),
    )?;
    let session = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;
    assert!(h.service.authenticate(&session.access_token).is_ok());

    let token_hash = hex::encode(Sha256::digest(session.refresh_token.as_bytes()));
    let stored = h.tokens.find_by_hash(&token_hash).await?;
    let lifetime = stored.map(|t| t.expires_at - t.created_at);
    assert_eq!(lifetime, Some(TimeDelta::days(3650)));
    Ok(())
}

#[tokio::test]
async fn email_only_update_leaves_name_and_roles() -> Result<()> {
    let h = harness()?;
    let ann = h.service.sign_up(sign_up("Ann", "ann@x.io")).await?;
    let id = uuid::Uuid::parse_str(&ann.user.id)?;
    assert!(h.users.set_roles(id, vec!["admin".to_string()]).await);

    // A stored name that would no longer pass validation is not re-checked.
    let mut legacy = h
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("missing user"))?;
    legacy.username = "A".to_string();
    h.users.update_profile(&legacy).await?;

    let updated = h
        .service
        .update_user(UserUpdate {
            id: ann.user.id.clone(),
            email: Some("Ann.New@X.io".to_string()),
            ..UserUpdate::default()
        })
        .await?;
    assert_eq!(updated.email, "ann.new@x.io");
    assert_eq!(updated.name, "A");
    assert_eq!(updated.roles, ["admin"]);

    let stored = h.users.find_by_id(id).await?;
    assert_eq!(stored.as_ref().map(|u| u.username.as_str()), Some("A"));
    assert_eq!(stored.map(|u| u.roles), Some(vec!["admin".to_string()]));

    let err = h
        .service
        .update_user(UserUpdate {
            id: ann.user.id.clone(),
            email: Some("not-an-email".to_string()),
            ..UserUpdate::default()
        })
        .await
        .err();
    assert!(matches!(
        err,
        Some(AuthError::Validation(ValidationError::InvalidEmail))
    ));
    Ok(())
}
