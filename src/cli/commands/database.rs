use clap::{Arg, Command};

pub const ARG_DB_MAX_CONNECTIONS: &str = "db-max-connections";
pub const ARG_DB_STATEMENT_TIMEOUT_SECONDS: &str = "db-statement-timeout-seconds";

#[derive(Debug)]
pub struct Options {
    pub max_connections: u32,
    pub statement_timeout_seconds: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &clap::ArgMatches) -> Self {
        Self {
            max_connections: matches
                .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
                .copied()
                .unwrap_or(5),
            statement_timeout_seconds: matches
                .get_one::<u64>(ARG_DB_STATEMENT_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DB_MAX_CONNECTIONS)
                .long(ARG_DB_MAX_CONNECTIONS)
                .help("Maximum connections in the database pool")
                .env("ASSETRA_DB_MAX_CONNECTIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_DB_STATEMENT_TIMEOUT_SECONDS)
                .long(ARG_DB_STATEMENT_TIMEOUT_SECONDS)
                .help("Upper bound for a single database statement, in seconds")
                .env("ASSETRA_DB_STATEMENT_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
