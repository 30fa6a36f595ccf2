//! Postgres-backed stores.
//!
//! Every statement runs inside a `db.query` span and is bounded by the
//! configured statement timeout; streamed listings bound each row fetch.
//! Schema lives in `sql/schema.sql`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use sqlx::{Connection, PgPool};
use std::{future::Future, io, time::Duration};
use tracing::{Instrument, Span, info_span};
use uuid::Uuid;

use super::{InsertOutcome, RefreshTokenStore, UpdateOutcome, UserStore};
use crate::auth::models::{NewUser, RefreshTokenRecord, User};

pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(5);

const USER_COLUMNS: &str = "id, username, email, password_hash, roles, created_at, updated_at, failed_login_attempts, locked_until";

fn query_span(operation: &'static str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, sqlx::Error>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
        Err(sqlx::Error::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("statement exceeded {}s", limit.as_secs()),
        )))
    })
}

/// Apply the statement bound to every row fetch: the wait for the first row
/// and each gap after it. A timeout yields one error and ends the stream.
fn bounded_rows<'a, T: Send + 'a>(
    rows: BoxStream<'a, Result<T, sqlx::Error>>,
    limit: Duration,
    span: Span,
) -> BoxStream<'a, Result<T, sqlx::Error>> {
    stream::unfold(Some(rows), move |rows| {
        let span = span.clone();
        async move {
            let mut rows = rows?;
            let next = bounded(limit, rows.try_next()).instrument(span).await;
            match next {
                Ok(Some(row)) => Some((Ok(row), Some(rows))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        }
    })
    .boxed()
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    async fn find_one(&self, column: &'static str, value: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let span = query_span("SELECT", &query);
        bounded(
            self.statement_timeout,
            sqlx::query_as::<_, User>(&query)
                .bind(value)
                .fetch_optional(&self.pool),
        )
        .instrument(span)
        .await
        .with_context(|| format!("failed to find user by {column}"))
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<InsertOutcome> {
        let query = format!(
            "INSERT INTO users (username, email, password_hash, roles, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let span = query_span("INSERT", &query);
        let result = bounded(
            self.statement_timeout,
            sqlx::query_as::<_, User>(&query)
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.roles)
                .bind(user.created_at)
                .bind(user.updated_at)
                .fetch_one(&self.pool),
        )
        .instrument(span)
        .await;

        match result {
            Ok(created) => Ok(InsertOutcome::Created(created)),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = query_span("SELECT", &query);
        bounded(
            self.statement_timeout,
            sqlx::query_as::<_, User>(&query)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .instrument(span)
        .await
        .context("failed to find user by id")
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email", email).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one("username", username).await
    }

    fn stream_all(&self) -> BoxStream<'_, Result<User>> {
        let query = "SELECT id, username, email, password_hash, roles, created_at, updated_at, \
                     failed_login_attempts, locked_until FROM users ORDER BY created_at, id";
        let rows = sqlx::query_as::<_, User>(query).fetch(&self.pool);
        bounded_rows(rows, self.statement_timeout, query_span("SELECT", query))
            .map(|row| row.context("failed to read user row"))
            .boxed()
    }

    async fn update_profile(&self, user: &User) -> Result<UpdateOutcome> {
        let query = r"
            UPDATE users
            SET username = $2, email = $3, password_hash = $4, updated_at = $5
            WHERE id = $1
        ";
        let span = query_span("UPDATE", query);
        let result = bounded(
            self.statement_timeout,
            sqlx::query(query)
                .bind(user.id)
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.updated_at)
                .execute(&self.pool),
        )
        .instrument(span)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Ok(UpdateOutcome::NotFound),
            Ok(_) => Ok(UpdateOutcome::Updated),
            Err(err) if is_unique_violation(&err) => Ok(UpdateOutcome::Conflict),
            Err(err) => Err(err).context("failed to update user"),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let query = "DELETE FROM users WHERE id = $1";
        let span = query_span("DELETE", query);
        let done = bounded(
            self.statement_timeout,
            sqlx::query(query).bind(id).execute(&self.pool),
        )
        .instrument(span)
        .await
        .context("failed to delete user")?;
        Ok(done.rows_affected() > 0)
    }

    async fn increment_failed_logins(&self, email: &str) -> Result<()> {
        let query =
            "UPDATE users SET failed_login_attempts = failed_login_attempts + 1 WHERE email = $1";
        let span = query_span("UPDATE", query);
        bounded(
            self.statement_timeout,
            sqlx::query(query).bind(email).execute(&self.pool),
        )
        .instrument(span)
        .await
        .context("failed to increment failed logins")?;
        Ok(())
    }

    async fn reset_failed_logins(&self, email: &str) -> Result<()> {
        let query =
            "UPDATE users SET failed_login_attempts = 0, locked_until = NULL WHERE email = $1";
        let span = query_span("UPDATE", query);
        bounded(
            self.statement_timeout,
            sqlx::query(query).bind(email).execute(&self.pool),
        )
        .instrument(span)
        .await
        .context("failed to reset failed logins")?;
        Ok(())
    }

    async fn lock_until(&self, email: &str, until: DateTime<Utc>) -> Result<()> {
        let query = "UPDATE users SET locked_until = $2 WHERE email = $1";
        let span = query_span("UPDATE", query);
        bounded(
            self.statement_timeout,
            sqlx::query(query).bind(email).bind(until).execute(&self.pool),
        )
        .instrument(span)
        .await
        .context("failed to lock account")?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .context("failed to acquire database connection")?;
            conn.ping().await.context("failed to ping database")
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgRefreshTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, token: &RefreshTokenRecord) -> Result<()> {
        let query = r"
            INSERT INTO refresh_tokens (token_hash, user_id, expires_at, created_at, revoked)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = query_span("INSERT", query);
        bounded(
            self.statement_timeout,
            sqlx::query(query)
                .bind(&token.token_hash)
                .bind(token.user_id)
                .bind(token.expires_at)
                .bind(token.created_at)
                .bind(token.revoked)
                .execute(&self.pool),
        )
        .instrument(span)
        .await
        .context("failed to insert refresh token")?;
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>> {
        let query = r"
            SELECT user_id, token_hash, expires_at, created_at, revoked
            FROM refresh_tokens
            WHERE token_hash = $1
        ";
        let span = query_span("SELECT", query);
        bounded(
            self.statement_timeout,
            sqlx::query_as::<_, RefreshTokenRecord>(query)
                .bind(token_hash)
                .fetch_optional(&self.pool),
        )
        .instrument(span)
        .await
        .context("failed to find refresh token")
    }

    async fn revoke(&self, token_hash: &str) -> Result<bool> {
        let query = "UPDATE refresh_tokens SET revoked = TRUE WHERE token_hash = $1";
        let span = query_span("UPDATE", query);
        let done = bounded(
            self.statement_timeout,
            sqlx::query(query).bind(token_hash).execute(&self.pool),
        )
        .instrument(span)
        .await
        .context("failed to revoke refresh token")?;
        Ok(done.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{borrow::Cow, error::Error, fmt};

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("test database error")
        }
    }

    impl Error for TestDbError {}

    impl sqlx::error::DatabaseError for TestDbError {
        fn message(&self) -> &str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError { code: None }));
        assert!(!is_unique_violation(&err));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn slow_statements_time_out() {
        let result: Result<(), sqlx::Error> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(sqlx::Error::Io(ref e)) if e.kind() == io::ErrorKind::TimedOut));
    }

    #[tokio::test]
    async fn stalled_row_streams_time_out() {
        let rows = stream::iter([Ok(1), Ok(2)])
            .chain(stream::pending())
            .boxed();
        let collected: Vec<Result<i32, sqlx::Error>> =
            bounded_rows(rows, Duration::from_millis(10), Span::none())
                .collect()
                .await;

        assert_eq!(collected.len(), 3);
        assert!(matches!(collected[0], Ok(1)));
        assert!(matches!(collected[1], Ok(2)));
        assert!(matches!(collected[2], Err(sqlx::Error::Io(ref e)) if e.kind() == io::ErrorKind::TimedOut));
    }

    #[tokio::test]
    async fn finished_row_streams_end_cleanly() {
        let rows = stream::iter([Ok::<_, sqlx::Error>("a")]).boxed();
        let collected: Vec<_> = bounded_rows(rows, Duration::from_secs(1), Span::none())
            .collect()
            .await;
        assert_eq!(collected.len(), 1);
        assert!(matches!(collected[0], Ok("a")));
    }
}
