//! Bearer authentication and the self-or-admin rule.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use tracing::debug;
use uuid::Uuid;

use super::error::ApiError;
use crate::auth::{AuthService, TokenPayload, models::ADMIN_ROLE};

/// Caller identity taken from a verified access token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl Principal {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| role == ADMIN_ROLE)
    }

    #[must_use]
    pub fn is_self(&self, id: &str) -> bool {
        match (Uuid::parse_str(self.user_id.trim()), Uuid::parse_str(id.trim())) {
            (Ok(own), Ok(target)) => own == target,
            _ => self.user_id == id,
        }
    }

    #[must_use]
    pub fn can_access(&self, id: &str) -> bool {
        self.is_self(id) || self.is_admin()
    }
}

impl From<TokenPayload> for Principal {
    fn from(payload: TokenPayload) -> Self {
        Self {
            user_id: payload.user_id,
            roles: payload.roles,
        }
    }
}

/// Resolve the bearer token into a principal, or 401.
pub fn require_auth(headers: &HeaderMap, service: &AuthService) -> Result<Principal, ApiError> {
    let token = extract_bearer_token(headers).ok_or_else(ApiError::unauthorized)?;
    service
        .authenticate(&token)
        .map(Principal::from)
        .map_err(|err| {
            debug!("bearer token rejected: {err}");
            ApiError::unauthorized()
        })
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
