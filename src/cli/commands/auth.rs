use clap::{Arg, Command};

use crate::auth::config::{
    DEFAULT_ACCESS_TOKEN_TTL_SECONDS, DEFAULT_LOCKOUT_SECONDS, DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
    MAX_DURATION_SECONDS,
};
use crate::auth::lockout::DEFAULT_MAX_FAILED_ATTEMPTS;

pub const ARG_SECURITY_KEY: &str = "security-key";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_SECONDS: &str = "refresh-token-ttl-seconds";
pub const ARG_MAX_FAILED_LOGINS: &str = "max-failed-logins";
pub const ARG_LOCKOUT_SECONDS: &str = "lockout-seconds";

#[derive(Debug)]
pub struct Options {
    pub security_key: secrecy::SecretString,
    pub frontend_base_url: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub max_failed_logins: i32,
    pub lockout_seconds: i64,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> anyhow::Result<Self> {
        let security_key = matches
            .get_one::<String>(ARG_SECURITY_KEY)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_SECURITY_KEY}"))?;
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            security_key: secrecy::SecretString::from(security_key),
            frontend_base_url,
            access_token_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECONDS),
            refresh_token_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_SECONDS),
            max_failed_logins: matches
                .get_one::<i32>(ARG_MAX_FAILED_LOGINS)
                .copied()
                .unwrap_or(DEFAULT_MAX_FAILED_ATTEMPTS),
            lockout_seconds: matches
                .get_one::<i64>(ARG_LOCKOUT_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_LOCKOUT_SECONDS),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = command
        .arg(
            Arg::new(ARG_SECURITY_KEY)
                .long(ARG_SECURITY_KEY)
                .help("HMAC secret for signing access tokens, at least 32 bytes")
                .env("ASSETRA_SECURITY_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL allowed by CORS; https enables Secure cookies")
                .env("ASSETRA_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        );
    with_session_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token lifetime in seconds")
                .env("ASSETRA_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_DURATION_SECONDS)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .long(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .help("Refresh token lifetime in seconds")
                .env("ASSETRA_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_DURATION_SECONDS)),
        )
        .arg(
            Arg::new(ARG_MAX_FAILED_LOGINS)
                .long(ARG_MAX_FAILED_LOGINS)
                .help("Failed sign-ins before the account is locked")
                .env("ASSETRA_MAX_FAILED_LOGINS")
                .default_value("3")
                .value_parser(clap::value_parser!(i32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_SECONDS)
                .long(ARG_LOCKOUT_SECONDS)
                .help("How long a locked account stays locked, in seconds")
                .env("ASSETRA_LOCKOUT_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_DURATION_SECONDS)),
        )
}
