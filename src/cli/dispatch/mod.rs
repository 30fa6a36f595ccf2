//! Map validated CLI arguments to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, database};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let database_opts = database::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        security_key: auth_opts.security_key,
        frontend_base_url: auth_opts.frontend_base_url,
        db_max_connections: database_opts.max_connections,
        db_statement_timeout_seconds: database_opts.statement_timeout_seconds,
        access_token_ttl_seconds: auth_opts.access_token_ttl_seconds,
        refresh_token_ttl_seconds: auth_opts.refresh_token_ttl_seconds,
        max_failed_logins: auth_opts.max_failed_logins,
        lockout_seconds: auth_opts.lockout_seconds,
    }))
}
