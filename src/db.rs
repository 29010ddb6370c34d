use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::result::Error as DieselError;
use diesel::sqlite::SqliteConnection;
use tracing::warn;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// How many times a write is retried when SQLite reports the database as busy
const MAX_BUSY_RETRIES: u32 = 5;

/// Delay before the first retry; doubled on every further attempt
const BUSY_RETRY_BASE_DELAY: Duration = Duration::from_millis(20);

/// Applies per-connection pragmas
///
/// SQLite scopes `foreign_keys` and `busy_timeout` to the connection, so they
/// must be set every time the pool opens one.
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 2000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Creates the connection pool for `database_url`
///
/// ### Errors
///
/// Returns an error if the first connection cannot be established.
pub fn init_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)?;
    Ok(pool)
}

/// Returns true if the error is SQLite reporting a locked or busy database
fn is_busy(err: &DieselError) -> bool {
    match err {
        DieselError::DatabaseError(_, info) => {
            let message = info.message();
            message.contains("locked") || message.contains("busy")
        }
        _ => false,
    }
}

/// Runs a write operation, retrying it while SQLite reports the database as busy
///
/// The closure is re-run from scratch on every attempt, so it should contain
/// the whole statement (or transaction).
pub async fn with_retry<T, F>(mut operation: F) -> Result<T, DieselError>
where
    F: FnMut() -> Result<T, DieselError>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Err(err) if is_busy(&err) && attempt < MAX_BUSY_RETRIES => {
                let delay = BUSY_RETRY_BASE_DELAY * 2u32.pow(attempt);
                warn!("Database busy, retrying in {:?} (attempt {})", delay, attempt + 1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::result::DatabaseErrorKind;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_with_retry_returns_first_success() {
        let calls = Cell::new(0);
        let result = with_retry(|| {
            calls.set(calls.get() + 1);
            Ok::<_, DieselError>(7)
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_with_retry_retries_busy_errors() {
        let calls = Cell::new(0);
        let result = with_retry(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(DieselError::DatabaseError(
                    DatabaseErrorKind::Unknown,
                    Box::new("database is locked".to_string()),
                ))
            } else {
                Ok(calls.get())
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_other_errors() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(DieselError::NotFound)
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
