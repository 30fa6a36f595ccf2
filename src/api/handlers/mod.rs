pub mod auth;
pub mod health;
pub mod users;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use super::error::{ApiError, MSG_EMPTY_BODY};

/// Decode a JSON body, answering 400 for empty or malformed input.
pub(crate) fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request(MSG_EMPTY_BODY));
    }
    serde_json::from_slice(body).map_err(|err| ApiError::bad_request(err.to_string()))
}
