//! Credential authentication and session tokens.
//!
//! Passwords are stored as Argon2id hashes. A session is a short-lived HS256
//! access token plus a long-lived opaque refresh secret whose SHA-256 digest is
//! persisted. Refresh secrets rotate on every use. Repeated sign-in failures
//! lock the account for a while.

pub mod clock;
pub mod config;
pub mod error;
pub mod lockout;
pub mod models;
pub mod password;
pub mod service;
pub mod tokens;
pub mod validators;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use error::{AuthError, DuplicateField, ValidationError};
pub use models::{PublicUser, RotatedTokens, Session, SignInRequest, SignUpRequest, UserUpdate};
pub use service::AuthService;
pub use tokens::{SigningKey, TokenPayload};
