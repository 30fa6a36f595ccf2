use crate::{
    api::{self, DatabaseConfig, GatewayConfig},
    auth::{AuthConfig, SigningKey},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub security_key: SecretString,
    pub frontend_base_url: String,
    pub db_max_connections: u32,
    pub db_statement_timeout_seconds: u64,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub max_failed_logins: i32,
    pub lockout_seconds: i64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing key is too short, the database is unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let signing_key = SigningKey::new(&args.security_key).context("Invalid security key")?;

    let auth_config = AuthConfig::new()
        .with_access_token_ttl_seconds(args.access_token_ttl_seconds)
        .with_refresh_token_ttl_seconds(args.refresh_token_ttl_seconds)
        .with_max_failed_logins(args.max_failed_logins)
        .with_lockout_seconds(args.lockout_seconds);

    let database = DatabaseConfig {
        max_connections: args.db_max_connections,
        statement_timeout: Duration::from_secs(args.db_statement_timeout_seconds),
    };

    debug!("auth config: {auth_config:?}, database: {database:?}");

    api::new(
        args.port,
        &args.dsn,
        database,
        signing_key,
        auth_config,
        GatewayConfig::new(args.frontend_base_url),
    )
    .await
}
