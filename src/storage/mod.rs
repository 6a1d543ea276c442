//! SQLite-backed persistence.
//!
//! Every feature owns one database file under the configured data directory.
//! All statements go through [retry_on_busy]: write contention on the shared
//! file surfaces as `SQLITE_BUSY`/`SQLITE_LOCKED` and is retried after a
//! short yield, invisible to callers. Any other storage error propagates.

mod config_store;
mod record_store;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqliteJournalMode;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub use config_store::ConfigRecord;
pub use config_store::ConfigStore;
pub use config_store::SqliteQuery;
pub use record_store::MessageKey;
pub use record_store::RecordStore;
pub use record_store::TrackedMessage;

/// Pause between retries of a contended statement.
const BUSY_BACKOFF: Duration = Duration::from_millis(50);

/// Open (creating if missing) the database file for one feature.
pub async fn open(data_dir: &Path, feature: &str) -> Result<SqlitePool, sqlx::Error> {
    let path = data_dir.join(format!("{feature}.db"));
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
}

/// Reclaim file space after bulk deletes.
pub async fn vacuum(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    retry_on_busy(move || async move { sqlx::query("VACUUM").execute(pool).await }).await?;
    Ok(())
}

/// Run `op` until it either succeeds or fails with a non-transient error.
///
/// Retry count is unbounded; in practice the store's own busy timeout bounds
/// how long a single attempt can stall. An explicit loop, so sustained
/// contention never grows the stack.
pub async fn retry_on_busy<T, F, Fut>(op: F) -> Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    loop {
        match op().await {
            Err(err) if is_busy(&err) => {
                tracing::debug!("storage busy, retrying: {err}");
                tokio::time::sleep(BUSY_BACKOFF).await;
            }
            other => return other,
        }
    }
}

/// Whether an error is write-write contention on the database file.
///
/// Decided by SQLite primary error code: 5 is `SQLITE_BUSY`, 6 is
/// `SQLITE_LOCKED`. Everything else is treated as fatal to the operation.
pub fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("5") | Some("6")),
        _ => false,
    }
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // A single connection, every connection to `:memory:` is its own database.
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool")
}
