//! User management endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the bearer token.
//! 2) Allow the caller's own id, or any id for admins.
//! 3) Delegate to the service and map its errors.

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use std::sync::Arc;
use tracing::{error, warn};

use super::{
    auth::clear_refresh_cookie,
    parse_json_body,
};
use crate::{
    api::{
        GatewayConfig,
        error::{ApiError, ErrorBody},
        principal::{Principal, require_auth},
    },
    auth::{AuthService, PublicUser, UserUpdate, models::ADMIN_ROLE},
};

#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "Every user (admin only).", body = [PublicUser]),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorBody),
        (status = 403, description = "Caller is not an admin.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let principal = require_auth(&headers, &service)?;
    if !principal.is_admin() || !still_admin(&service, &principal).await {
        warn!("[SECURITY] user {} denied user listing", principal.user_id);
        return Err(ApiError::forbidden());
    }

    let users: Vec<PublicUser> = service
        .list_users()
        .try_collect()
        .await
        .map_err(ApiError::users)?;
    Ok(Json(users))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User detail.", body = PublicUser),
        (status = 400, description = "Invalid user id.", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorBody),
        (status = 403, description = "Not the caller's own id and caller is not an admin.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
) -> Result<Json<PublicUser>, ApiError> {
    let principal = require_auth(&headers, &service)?;
    if !principal.can_access(&id) {
        return Err(ApiError::forbidden());
    }

    service
        .get_user(&id)
        .await
        .map(Json)
        .map_err(ApiError::users)
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    params(
        ("id" = String, Path, description = "User id; ignored for non-admin callers")
    ),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user.", body = PublicUser),
        (status = 400, description = "Invalid input or duplicate account.", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    body: Bytes,
) -> Result<Json<PublicUser>, ApiError> {
    let principal = require_auth(&headers, &service)?;
    let mut update: UserUpdate = parse_json_body(&body)?;

    // Non-admins can only ever edit themselves.
    update.id = if principal.is_admin() {
        id
    } else {
        principal.user_id.clone()
    };

    service
        .update_user(update)
        .await
        .map(Json)
        .map_err(ApiError::users)
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 204, description = "User deleted; refresh cookie cleared when deleting oneself."),
        (status = 400, description = "Invalid user id.", body = ErrorBody),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorBody),
        (status = 403, description = "Not the caller's own id and caller is not an admin.", body = ErrorBody),
        (status = 404, description = "User not found.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    config: Extension<Arc<GatewayConfig>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &service)?;
    let deleting_self = principal.is_self(&id);
    if !deleting_self && !(principal.is_admin() && still_admin(&service, &principal).await) {
        warn!("[SECURITY] user {} denied deleting {id}", principal.user_id);
        return Err(ApiError::forbidden());
    }

    service.delete_user(&id).await.map_err(ApiError::users)?;

    let mut response_headers = HeaderMap::new();
    if deleting_self {
        match clear_refresh_cookie(&config) {
            Ok(cookie) => {
                response_headers.insert(SET_COOKIE, cookie);
            }
            Err(err) => error!("failed to build cleared refresh cookie: {err}"),
        }
    }
    Ok((StatusCode::NO_CONTENT, response_headers).into_response())
}

/// Token roles can outlive a demotion; confirm against the stored account.
async fn still_admin(service: &AuthService, principal: &Principal) -> bool {
    match service.get_user(&principal.user_id).await {
        Ok(user) => user.roles.iter().any(|role| role == ADMIN_ROLE),
        Err(err) => {
            warn!("failed to confirm admin role for {}: {err}", principal.user_id);
            false
        }
    }
}
