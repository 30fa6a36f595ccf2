//! Session endpoints: sign-up, sign-in, refresh and logout.
//!
//! The refresh secret travels only in the `refresh_token` cookie; response
//! bodies carry the user and the access token.

use axum::{
    Json,
    body::Bytes,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::parse_json_body;
use crate::{
    api::{
        GatewayConfig,
        error::{ApiError, ErrorBody},
    },
    auth::{AuthService, PublicUser, Session, SignInRequest, SignUpRequest},
};

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionBody {
    pub user: PublicUser,
    pub access_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccessTokenBody {
    pub access_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageBody {
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/signup",
    request_body = SignUpRequest,
    responses(
        (status = 200, description = "Account created; refresh cookie set.", body = SessionBody),
        (status = 400, description = "Empty or malformed body.", body = ErrorBody),
        (status = 413, description = "Body larger than 1 MiB."),
        (status = 422, description = "Invalid fields or duplicate account.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn sign_up(
    service: Extension<Arc<AuthService>>,
    config: Extension<Arc<GatewayConfig>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: SignUpRequest = parse_json_body(&body)?;
    let session = service.sign_up(request).await.map_err(ApiError::session)?;
    session_response(&service, &config, session)
}

#[utoipa::path(
    post,
    path = "/signin",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in; refresh cookie set.", body = SessionBody),
        (status = 400, description = "Empty or malformed body.", body = ErrorBody),
        (status = 401, description = "Invalid credentials or account locked.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn sign_in(
    service: Extension<Arc<AuthService>>,
    config: Extension<Arc<GatewayConfig>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: SignInRequest = parse_json_body(&body)?;
    let session = service.sign_in(request).await.map_err(ApiError::session)?;
    session_response(&service, &config, session)
}

#[utoipa::path(
    post,
    path = "/refresh-token",
    responses(
        (status = 200, description = "Access token renewed; refresh cookie rotated.", body = AccessTokenBody),
        (status = 401, description = "Missing, unknown, revoked or expired refresh token.", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    config: Extension<Arc<GatewayConfig>>,
) -> Result<Response, ApiError> {
    let secret = extract_refresh_token(&headers).ok_or_else(|| {
        ApiError::new(StatusCode::UNAUTHORIZED, "refresh token not found")
    })?;
    let rotated = service
        .refresh_token(&secret)
        .await
        .map_err(ApiError::session)?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        SET_COOKIE,
        refresh_cookie(&config, &rotated.refresh_token, max_age(&service))
            .map_err(cookie_failure)?,
    );
    Ok((
        StatusCode::OK,
        response_headers,
        Json(AccessTokenBody {
            access_token: rotated.access_token,
        }),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Refresh token revoked and cookie cleared.", body = MessageBody),
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    config: Extension<Arc<GatewayConfig>>,
) -> impl IntoResponse {
    if let Some(secret) = extract_refresh_token(&headers) {
        service.revoke_refresh_token(&secret).await;
    }

    // Always clear the cookie, even if nothing was revoked.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_refresh_cookie(&config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(MessageBody {
            message: "logged out successfully".to_string(),
        }),
    )
}

fn session_response(
    service: &AuthService,
    config: &GatewayConfig,
    session: Session,
) -> Result<Response, ApiError> {
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        SET_COOKIE,
        refresh_cookie(config, &session.refresh_token, max_age(service))
            .map_err(cookie_failure)?,
    );
    Ok((
        StatusCode::OK,
        response_headers,
        Json(SessionBody {
            user: session.user,
            access_token: session.access_token,
        }),
    )
        .into_response())
}

fn max_age(service: &AuthService) -> i64 {
    service.config().refresh_token_ttl_seconds()
}

fn cookie_failure(err: InvalidHeaderValue) -> ApiError {
    error!("failed to build refresh cookie: {err}");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "authentication failed")
}

/// `HttpOnly; SameSite=Strict` cookie carrying the refresh secret.
pub(crate) fn refresh_cookie(
    config: &GatewayConfig,
    token: &str,
    max_age_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age_seconds}"
    );
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_refresh_cookie(
    config: &GatewayConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    refresh_cookie(config, "", 0)
}

pub(crate) fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == REFRESH_COOKIE_NAME && !val.trim().is_empty())
                .then(|| val.trim().to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_attributes() -> anyhow::Result<()> {
        let plain = GatewayConfig::new("http://localhost:3000".to_string());
        let cookie = refresh_cookie(&plain, "abc", 604_800)?;
        assert_eq!(
            cookie.to_str()?,
            "refresh_token=abc; Path=/; HttpOnly; SameSite=Strict; Max-Age=604800"
        );

        let secure = GatewayConfig::new("https://app.assetra.dev".to_string());
        let cleared = clear_refresh_cookie(&secure)?;
        assert_eq!(
            cleared.to_str()?,
            "refresh_token=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0; Secure"
        );
        Ok(())
    }

    #[test]
    fn refresh_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_refresh_token(&headers), None);

        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=abc123; other=1"),
        );
        assert_eq!(extract_refresh_token(&headers), Some("abc123".to_string()));

        headers.insert(COOKIE, HeaderValue::from_static("refresh_token="));
        assert_eq!(extract_refresh_token(&headers), None);
    }
}
