//! Pure input checks and normalization for account fields.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::error;
use uuid::Uuid;

use super::{
    error::ValidationError,
    models::{SignUpRequest, UserUpdate},
};

pub const EMAIL_MAX_LEN: usize = 100;
pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

const FORBIDDEN_NAME_CHARS: [char; 5] = ['<', '>', '&', '"', '\''];

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$";

// A pattern that fails to compile rejects every email.
static EMAIL_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(EMAIL_PATTERN)
        .map_err(|err| error!("email pattern failed to compile: {err}"))
        .ok()
});

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trim and strip markup-significant characters.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| !FORBIDDEN_NAME_CHARS.contains(c))
        .collect()
}

/// # Errors
/// Returns `InvalidEmail` or `EmailTooLong`.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::InvalidEmail);
    }
    if email.len() > EMAIL_MAX_LEN {
        return Err(ValidationError::EmailTooLong);
    }
    let matches = EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email));
    if matches {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

/// Checks the trimmed name; length is counted in characters.
///
/// # Errors
/// Returns the first name rule that fails.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::InvalidName);
    }
    let len = name.chars().count();
    if len < NAME_MIN_LEN {
        return Err(ValidationError::NameTooShort);
    }
    if len > NAME_MAX_LEN {
        return Err(ValidationError::NameTooLong);
    }
    if name.contains(FORBIDDEN_NAME_CHARS) {
        return Err(ValidationError::NameInvalidCharacters);
    }
    Ok(())
}

/// # Errors
/// Returns `WeakPassword` when length or character classes fall short.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(ValidationError::WeakPassword);
    }

    let (mut upper, mut lower, mut digit, mut special) = (false, false, false, false);
    for c in password.chars() {
        if c.is_uppercase() {
            upper = true;
        } else if c.is_lowercase() {
            lower = true;
        } else if c.is_numeric() {
            digit = true;
        } else if is_special(c) {
            special = true;
        }
    }

    if upper && lower && digit && special {
        Ok(())
    } else {
        Err(ValidationError::WeakPassword)
    }
}

fn is_special(c: char) -> bool {
    c.is_ascii_punctuation() || !(c.is_alphanumeric() || c.is_whitespace() || c.is_control())
}

/// Validates a registration; the email is checked in its normalized form.
///
/// # Errors
/// Returns the first field that fails, checked as email, name, password.
pub fn validate_sign_up(request: &SignUpRequest) -> Result<(), ValidationError> {
    validate_email(&normalize_email(&request.email))?;
    validate_name(&request.name)?;
    validate_password(&request.password)
}

/// Validates only the fields that are present.
///
/// # Errors
/// Returns `NoFieldsProvided` when nothing would change, otherwise the first failing field.
pub fn validate_update(update: &UserUpdate) -> Result<(), ValidationError> {
    if update.is_empty() {
        return Err(ValidationError::NoFieldsProvided);
    }
    if let Some(email) = update.email() {
        validate_email(&normalize_email(email))?;
    }
    if let Some(name) = update.name() {
        validate_name(name)?;
    }
    if let Some(password) = update.password() {
        validate_password(password)?;
    }
    Ok(())
}

/// # Errors
/// Returns `InvalidIdentifier` when `id` is not a UUID.
pub fn parse_user_id(id: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(id.trim()).map_err(|_| ValidationError::InvalidIdentifier)
}
