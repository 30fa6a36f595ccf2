use std::fmt;
use thiserror::Error;

/// Input rejected before any store is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid email format")]
    InvalidEmail,
    #[error("email must be at most 100 characters")]
    EmailTooLong,
    #[error("invalid name format")]
    InvalidName,
    #[error("name must be at least 2 characters")]
    NameTooShort,
    #[error("name must be at most 50 characters")]
    NameTooLong,
    #[error("name contains invalid characters")]
    NameInvalidCharacters,
    #[error(
        "password must be 8 to 128 characters and contain uppercase, lowercase, number and special character"
    )]
    WeakPassword,
    #[error("no fields provided to update")]
    NoFieldsProvided,
    #[error("invalid user ID format")]
    InvalidIdentifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Email,
    Username,
    EmailOrUsername,
}

impl fmt::Display for DuplicateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Email => "email",
            Self::Username => "username",
            Self::EmailOrUsername => "email or username",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("there is already one user with this {0} registered")]
    DuplicateUser(DuplicateField),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account locked due to multiple failed login attempts")]
    AccountLocked,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("no user found with id: {0}")]
    NotFound(String),
    /// Store or crypto failure; the message is safe to show callers.
    #[error("{0}")]
    Internal(&'static str),
}

impl AuthError {
    pub(crate) const fn internal() -> Self {
        Self::Internal("authentication failed")
    }
}
