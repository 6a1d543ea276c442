//! Generic per-guild settings table.
//!
//! Every feature keeps one row of settings per guild, keyed by the guild id,
//! with `created_at`/`updated_at` timestamps maintained on write. The row
//! shape differs per feature; [ConfigRecord] supplies the table-specific SQL
//! and [ConfigStore] supplies the behavior shared by all of them.

use std::marker::PhantomData;

use sqlx::sqlite::SqliteArguments;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use sqlx::Sqlite;
use sqlx::SqlitePool;
use tracing::warn;

use super::retry_on_busy;
use crate::serenity;

/// Bound query type shared by the trait and the store.
pub type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// One feature's per-guild settings row.
///
/// Implementors provide the table DDL and an upsert statement. The upsert
/// must key on `guild_id` and leave `created_at` untouched on conflict while
/// refreshing every other column, so repeated registration is idempotent.
pub trait ConfigRecord: for<'r> FromRow<'r, SqliteRow> + Send + Sync + Unpin {
    /// Table the rows live in.
    const TABLE: &'static str;
    /// `CREATE TABLE IF NOT EXISTS` statement for [Self::TABLE].
    const SCHEMA: &'static str;
    /// Insert-or-update statement keyed on `guild_id`.
    const UPSERT: &'static str;

    /// Bind this record's values in the order [Self::UPSERT] expects.
    fn bind_upsert<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;
}

/// Per-guild settings store over some [ConfigRecord] row shape.
pub struct ConfigStore<T> {
    pool: SqlitePool,
    record: PhantomData<T>,
}

// Derived Clone would demand T: Clone for no reason.
impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            record: PhantomData,
        }
    }
}

impl<T: ConfigRecord> ConfigStore<T> {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            record: PhantomData,
        }
    }

    /// Create the backing table if it does not exist yet.
    pub async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::query(T::SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Point lookup by guild. A row that fails to decode (schema drift,
    /// hand-edited file) is logged and reported as absent, never an error.
    pub async fn get(&self, guild_id: serenity::GuildId) -> Result<Option<T>, sqlx::Error> {
        let sql = format!("SELECT * FROM {} WHERE guild_id = ?", T::TABLE);
        let sql = sql.as_str();
        let id = guild_id.get() as i64;
        let pool = &self.pool;

        let row = retry_on_busy(move || async move {
            sqlx::query(sql).bind(id).fetch_optional(pool).await
        })
        .await?;

        Ok(row.and_then(|row| decode_row(&row)))
    }

    /// Insert-or-update the guild's settings. On conflict every column except
    /// `created_at` is overwritten and `updated_at` is refreshed.
    pub async fn register(&self, record: &T) -> Result<(), sqlx::Error> {
        let pool = &self.pool;

        retry_on_busy(move || async move {
            record.bind_upsert(sqlx::query(T::UPSERT)).execute(pool).await
        })
        .await?;
        Ok(())
    }

    /// Delete the guild's settings. Deleting an absent row is not an error.
    pub async fn unregister(&self, guild_id: serenity::GuildId) -> Result<(), sqlx::Error> {
        let sql = format!("DELETE FROM {} WHERE guild_id = ?", T::TABLE);
        let sql = sql.as_str();
        let id = guild_id.get() as i64;
        let pool = &self.pool;

        retry_on_busy(move || async move { sqlx::query(sql).bind(id).execute(pool).await })
            .await?;
        Ok(())
    }

    /// Full scan. Order is not significant; undecodable rows are skipped.
    pub async fn records(&self) -> Result<Vec<T>, sqlx::Error> {
        let sql = format!("SELECT * FROM {}", T::TABLE);
        let sql = sql.as_str();
        let pool = &self.pool;

        let rows =
            retry_on_busy(move || async move { sqlx::query(sql).fetch_all(pool).await }).await?;

        Ok(rows.iter().filter_map(decode_row).collect())
    }
}

/// Defensive decode: malformed persisted rows are treated as absent.
fn decode_row<T: ConfigRecord>(row: &SqliteRow) -> Option<T> {
    match T::from_row(row) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!("Dropping malformed row in {}: {err}", T::TABLE);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use chrono::Utc;

    use super::*;
    use crate::storage::memory_pool;

    #[derive(Debug, Clone, PartialEq, FromRow)]
    struct TestConfig {
        guild_id: i64,
        guild_name: String,
        threshold: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    }

    impl ConfigRecord for TestConfig {
        const TABLE: &'static str = "test_config";
        const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS test_config (
            guild_id INTEGER PRIMARY KEY,
            guild_name TEXT NOT NULL,
            threshold INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )";
        const UPSERT: &'static str = "INSERT INTO test_config
            (guild_id, guild_name, threshold, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                guild_name = excluded.guild_name,
                threshold = excluded.threshold,
                updated_at = excluded.updated_at";

        fn bind_upsert<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
            query
                .bind(self.guild_id)
                .bind(self.guild_name.clone())
                .bind(self.threshold)
                .bind(self.created_at)
                .bind(self.updated_at)
        }
    }

    fn record(guild_id: i64, threshold: i64) -> TestConfig {
        let now = Utc::now();
        TestConfig {
            guild_id,
            guild_name: "guild".to_string(),
            threshold,
            created_at: now,
            updated_at: now,
        }
    }

    async fn store() -> ConfigStore<TestConfig> {
        let store = ConfigStore::new(memory_pool().await);
        store.init().await.expect("init");
        store
    }

    #[tokio::test]
    async fn register_is_idempotent_and_preserves_created_at() {
        let store = store().await;
        let guild = serenity::GuildId::new(1);

        store.register(&record(1, 5)).await.expect("first register");
        let first = store.get(guild).await.expect("get").expect("present");

        // Same fields again, later timestamps.
        let mut again = record(1, 5);
        again.created_at = Utc::now();
        again.updated_at = again.created_at;
        store.register(&again).await.expect("second register");

        let second = store.get(guild).await.expect("get").expect("present");
        assert_eq!(second.threshold, 5);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn register_overwrites_fields_on_conflict() {
        let store = store().await;
        let guild = serenity::GuildId::new(1);

        store.register(&record(1, 5)).await.expect("register");
        store.register(&record(1, 9)).await.expect("re-register");

        let row = store.get(guild).await.expect("get").expect("present");
        assert_eq!(row.threshold, 9);
    }

    #[tokio::test]
    async fn unregister_deletes_and_tolerates_absence() {
        let store = store().await;
        let guild = serenity::GuildId::new(1);

        store.register(&record(1, 5)).await.expect("register");
        store.unregister(guild).await.expect("unregister");
        assert!(store.get(guild).await.expect("get").is_none());

        // Second delete of the same guild is a no-op, not an error.
        store.unregister(guild).await.expect("repeat unregister");
    }

    #[tokio::test]
    async fn records_returns_all_guilds() {
        let store = store().await;
        store.register(&record(1, 5)).await.expect("register");
        store.register(&record(2, 7)).await.expect("register");

        let mut rows = store.records().await.expect("records");
        rows.sort_by_key(|r| r.guild_id);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].threshold, 7);
    }

    #[tokio::test]
    async fn malformed_row_reads_as_absent() {
        let store = store().await;

        // Violate the row shape behind the store's back.
        sqlx::query(
            "INSERT INTO test_config (guild_id, guild_name, threshold, created_at, updated_at)
             VALUES (1, 'guild', 5, 'not-a-timestamp', 'not-a-timestamp')",
        )
        .execute(&store.pool)
        .await
        .expect("raw insert");

        assert!(store
            .get(serenity::GuildId::new(1))
            .await
            .expect("get")
            .is_none());
        assert!(store.records().await.expect("records").is_empty());
    }
}
