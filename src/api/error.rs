//! HTTP error bodies and the `AuthError` to status mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthError;

pub(crate) const MSG_EMPTY_BODY: &str = "body can't be empty";
pub(crate) const MSG_UNAUTHORIZED: &str = "unauthorized";
pub(crate) const MSG_FORBIDDEN: &str = "access forbidden";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Errors from sign-up and sign-in; bad input is 422.
    pub fn session(err: AuthError) -> Self {
        Self::from_auth(err, StatusCode::UNPROCESSABLE_ENTITY)
    }

    /// Errors from the user routes; bad input is 400.
    pub fn users(err: AuthError) -> Self {
        Self::from_auth(err, StatusCode::BAD_REQUEST)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, MSG_UNAUTHORIZED)
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, MSG_FORBIDDEN)
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    fn from_auth(err: AuthError, input_status: StatusCode) -> Self {
        let status = match &err {
            AuthError::Validation(_) | AuthError::DuplicateUser(_) => input_status,
            AuthError::InvalidCredentials
            | AuthError::AccountLocked
            | AuthError::InvalidToken
            | AuthError::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}
