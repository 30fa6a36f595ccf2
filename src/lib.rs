//! # Assetra (Credential Authentication Service)
//!
//! `assetra` registers users, authenticates them by email and password, and
//! issues sessions made of a short-lived JWT access token and a rotating
//! refresh token delivered as an `HttpOnly` cookie.
//!
//! ## Layers
//!
//! - **`auth`:** validation, hashing, token issuance, lockout and the
//!   orchestrating [`auth::AuthService`].
//! - **`storage`:** store traits with Postgres and in-memory adapters.
//! - **`api`:** the axum gateway that maps HTTP onto the service.
//! - **`cli`:** argument parsing, telemetry and server start-up.

pub mod api;
pub mod auth;
pub mod cli;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
