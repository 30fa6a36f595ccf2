use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use super::{
    error::ErrorBody,
    handlers::{auth, health, users},
};
use crate::auth::{PublicUser, SignInRequest, SignUpRequest, UserUpdate};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::sign_up,
        auth::sign_in,
        auth::refresh_token,
        auth::logout,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        health::health,
    ),
    components(schemas(
        SignUpRequest,
        SignInRequest,
        UserUpdate,
        PublicUser,
        ErrorBody,
        auth::SessionBody,
        auth::AccessTokenBody,
        auth::MessageBody,
        health::Health,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Sign-up, sign-in and session tokens"),
        (name = "users", description = "User management"),
        (name = "health", description = "Liveness and database status"),
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = Some(env!("CARGO_PKG_DESCRIPTION").to_string());
    doc
}
