//! Tracked-message store for the weekly awards feature.
//!
//! One row per message that currently has at least one reaction. The row is
//! a snapshot (names, content, author, link) plus a running reaction count
//! that is re-set wholesale on every reaction change. Rows age out after the
//! retention window via [RecordStore::delete_outdated].

use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use futures::Stream;
use futures::StreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use sqlx::SqlitePool;
use tracing::warn;

use super::config_store::SqliteQuery;
use super::is_busy;
use super::retry_on_busy;
use crate::serenity;

/// Composite key of one tracked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageKey {
    pub guild_id: i64,
    pub channel_id: i64,
    pub message_id: i64,
}

impl MessageKey {
    pub fn new(
        guild_id: serenity::GuildId,
        channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
    ) -> Self {
        Self {
            guild_id: guild_id.get() as i64,
            channel_id: channel_id.get() as i64,
            message_id: message_id.get() as i64,
        }
    }
}

/// Snapshot of one message being tracked for the weekly ranking.
#[derive(Debug, Clone, FromRow)]
pub struct TrackedMessage {
    pub guild_id: i64,
    pub channel_id: i64,
    pub message_id: i64,
    pub guild_name: String,
    pub channel_name: String,
    pub content: String,
    pub author: String,
    pub url: String,
    pub reactions_count: i64,
    /// When the message itself was posted. Basis for retention pruning.
    pub posted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedMessage {
    pub fn key(&self) -> MessageKey {
        MessageKey {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            message_id: self.message_id,
        }
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS tracked_message (
    guild_id INTEGER NOT NULL,
    channel_id INTEGER NOT NULL,
    message_id INTEGER NOT NULL,
    guild_name TEXT NOT NULL,
    channel_name TEXT NOT NULL,
    content TEXT NOT NULL,
    author TEXT NOT NULL,
    url TEXT NOT NULL,
    reactions_count INTEGER NOT NULL,
    posted_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (guild_id, channel_id, message_id)
)";

/// Last-write-wins: the bound count replaces the stored one, `posted_at` and
/// `created_at` keep their original values.
const UPSERT: &str = "INSERT INTO tracked_message
    (guild_id, channel_id, message_id, guild_name, channel_name,
     content, author, url, reactions_count, posted_at, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(guild_id, channel_id, message_id) DO UPDATE SET
        guild_name = excluded.guild_name,
        channel_name = excluded.channel_name,
        content = excluded.content,
        author = excluded.author,
        url = excluded.url,
        reactions_count = excluded.reactions_count,
        updated_at = excluded.updated_at";

const DELETE: &str =
    "DELETE FROM tracked_message WHERE guild_id = ? AND channel_id = ? AND message_id = ?";

/// Store of [TrackedMessage] rows, shared by the reaction handlers and the
/// weekly report cycle. Cheap to clone, the pool is reference counted.
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not exist yet.
    pub async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Point lookup. Malformed rows read as absent.
    pub async fn get(&self, key: MessageKey) -> Result<Option<TrackedMessage>, sqlx::Error> {
        let pool = &self.pool;
        let row = retry_on_busy(move || async move {
            sqlx::query(
                "SELECT * FROM tracked_message
                 WHERE guild_id = ? AND channel_id = ? AND message_id = ?",
            )
            .bind(key.guild_id)
            .bind(key.channel_id)
            .bind(key.message_id)
            .fetch_optional(pool)
            .await
        })
        .await?;

        Ok(row.and_then(|row| decode_row(&row)))
    }

    /// Upsert a snapshot. The reaction count always replaces the stored one,
    /// it never accumulates.
    pub async fn set(&self, item: &TrackedMessage) -> Result<(), sqlx::Error> {
        let pool = &self.pool;
        retry_on_busy(move || async move {
            bind_upsert(sqlx::query(UPSERT), item).execute(pool).await
        })
        .await?;
        Ok(())
    }

    pub async fn delete(&self, key: MessageKey) -> Result<(), sqlx::Error> {
        let pool = &self.pool;
        retry_on_busy(move || async move {
            sqlx::query(DELETE)
                .bind(key.guild_id)
                .bind(key.channel_id)
                .bind(key.message_id)
                .execute(pool)
                .await
        })
        .await?;
        Ok(())
    }

    /// Fully materialized scan, for the ranking pass.
    pub async fn all(&self) -> Result<Vec<TrackedMessage>, sqlx::Error> {
        let pool = &self.pool;
        let rows = retry_on_busy(move || async move {
            sqlx::query("SELECT * FROM tracked_message")
                .fetch_all(pool)
                .await
        })
        .await?;

        Ok(rows.iter().filter_map(decode_row).collect())
    }

    /// Lazy scan. Each call opens a fresh snapshot cursor; undecodable rows
    /// are skipped.
    pub fn iterate(&self) -> impl Stream<Item = TrackedMessage> + '_ {
        sqlx::query("SELECT * FROM tracked_message")
            .fetch(&self.pool)
            .filter_map(|row| async move {
                match row {
                    Ok(row) => decode_row(&row),
                    Err(err) => {
                        warn!("tracked_message scan error: {err}");
                        None
                    }
                }
            })
    }

    /// Apply one statement per item as a single atomic unit. Contention rolls
    /// the whole unit back and retries it, never individual items.
    pub async fn transaction<T, F>(&self, items: &[T], statement: F) -> Result<(), sqlx::Error>
    where
        T: Sync,
        F: for<'q> Fn(&'q T) -> SqliteQuery<'q>,
    {
        loop {
            let attempt = async {
                let mut tx = self.pool.begin().await?;
                for item in items {
                    statement(item).execute(&mut *tx).await?;
                }
                tx.commit().await
            };
            match attempt.await {
                Err(err) if is_busy(&err) => {
                    tracing::debug!("transaction contended, retrying: {err}");
                    tokio::time::sleep(super::BUSY_BACKOFF).await;
                }
                other => return other,
            }
        }
    }

    /// Two-phase retention prune for one guild: count the rows whose message
    /// is older than `max_age_days` (strict duration comparison, not calendar
    /// days), then delete them in one unit. Returns the count so the caller
    /// can decide whether a reclamation pass is worth it.
    pub async fn delete_outdated(
        &self,
        guild_id: serenity::GuildId,
        max_age_days: i64,
    ) -> Result<u64, sqlx::Error> {
        let now = Utc::now();
        let max_age = TimeDelta::seconds(max_age_days * 86_400);
        let guild = guild_id.get() as i64;

        let mut outdated = Vec::new();
        {
            let mut rows = std::pin::pin!(self.iterate());
            while let Some(item) = rows.next().await {
                if item.guild_id == guild && now - item.posted_at > max_age {
                    outdated.push(item.key());
                }
            }
        }

        let count = outdated.len() as u64;
        if count > 0 {
            self.transaction(&outdated, |key| {
                sqlx::query(DELETE)
                    .bind(key.guild_id)
                    .bind(key.channel_id)
                    .bind(key.message_id)
            })
            .await?;
        }

        Ok(count)
    }

    /// Reclaim file space; worth calling after a prune that deleted rows.
    pub async fn reclaim(&self) -> Result<(), sqlx::Error> {
        super::vacuum(&self.pool).await
    }

    /// Drop every row belonging to a guild (unregistration, bot removal).
    pub async fn delete_for_guild(&self, guild_id: serenity::GuildId) -> Result<(), sqlx::Error> {
        let guild = guild_id.get() as i64;
        let pool = &self.pool;
        retry_on_busy(move || async move {
            sqlx::query("DELETE FROM tracked_message WHERE guild_id = ?")
                .bind(guild)
                .execute(pool)
                .await
        })
        .await?;
        Ok(())
    }
}

fn bind_upsert<'q>(query: SqliteQuery<'q>, item: &TrackedMessage) -> SqliteQuery<'q> {
    query
        .bind(item.guild_id)
        .bind(item.channel_id)
        .bind(item.message_id)
        .bind(item.guild_name.clone())
        .bind(item.channel_name.clone())
        .bind(item.content.clone())
        .bind(item.author.clone())
        .bind(item.url.clone())
        .bind(item.reactions_count)
        .bind(item.posted_at)
        .bind(item.created_at)
        .bind(item.updated_at)
}

fn decode_row(row: &SqliteRow) -> Option<TrackedMessage> {
    match TrackedMessage::from_row(row) {
        Ok(item) => Some(item),
        Err(err) => {
            warn!("Dropping malformed tracked_message row: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_pool;

    fn item(message_id: i64, count: i64, posted_at: DateTime<Utc>) -> TrackedMessage {
        let now = Utc::now();
        TrackedMessage {
            guild_id: 10,
            channel_id: 20,
            message_id,
            guild_name: "guild".to_string(),
            channel_name: "general".to_string(),
            content: "hello".to_string(),
            author: "author".to_string(),
            url: "https://discord.com/channels/10/20/1".to_string(),
            reactions_count: count,
            posted_at,
            created_at: now,
            updated_at: now,
        }
    }

    async fn store() -> RecordStore {
        let store = RecordStore::new(memory_pool().await);
        store.init().await.expect("init");
        store
    }

    #[tokio::test]
    async fn reaction_count_is_last_write_wins() {
        let store = store().await;
        let posted = Utc::now();

        store.set(&item(1, 5, posted)).await.expect("set");
        store.set(&item(1, 3, posted)).await.expect("set again");

        let row = store
            .get(MessageKey {
                guild_id: 10,
                channel_id: 20,
                message_id: 1,
            })
            .await
            .expect("get")
            .expect("present");
        assert_eq!(row.reactions_count, 3);
    }

    #[tokio::test]
    async fn upsert_preserves_posted_at_and_created_at() {
        let store = store().await;
        let posted = Utc::now() - TimeDelta::hours(3);

        store.set(&item(1, 1, posted)).await.expect("set");
        let first = store.all().await.expect("all").remove(0);

        // Re-track with a bogus later posted_at; the original must survive.
        store.set(&item(1, 2, Utc::now())).await.expect("set again");
        let second = store.all().await.expect("all").remove(0);

        assert_eq!(second.posted_at, first.posted_at);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.reactions_count, 2);
    }

    #[tokio::test]
    async fn delete_outdated_reports_count_then_prunes() {
        let store = store().await;
        let now = Utc::now();

        store
            .set(&item(1, 4, now - TimeDelta::days(8)))
            .await
            .expect("set old");
        store
            .set(&item(2, 4, now - TimeDelta::days(6)))
            .await
            .expect("set fresh");

        let pruned = store
            .delete_outdated(serenity::GuildId::new(10), 7)
            .await
            .expect("prune");
        assert_eq!(pruned, 1);

        let remaining = store.all().await.expect("all");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message_id, 2);
    }

    #[tokio::test]
    async fn delete_outdated_only_touches_the_target_guild() {
        let store = store().await;
        let old = Utc::now() - TimeDelta::days(9);

        let mut other_guild = item(1, 4, old);
        other_guild.guild_id = 99;
        store.set(&other_guild).await.expect("set");
        store.set(&item(2, 4, old)).await.expect("set");

        let pruned = store
            .delete_outdated(serenity::GuildId::new(10), 7)
            .await
            .expect("prune");
        assert_eq!(pruned, 1);

        let remaining = store.all().await.expect("all");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].guild_id, 99);
    }

    #[tokio::test]
    async fn iterate_restarts_from_a_fresh_snapshot() {
        let store = store().await;
        store.set(&item(1, 2, Utc::now())).await.expect("set");

        let first: Vec<_> = store.iterate().collect().await;
        store.set(&item(2, 2, Utc::now())).await.expect("set");
        let second: Vec<_> = store.iterate().collect().await;

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn delete_for_guild_clears_only_that_guild() {
        let store = store().await;
        let mut foreign = item(5, 2, Utc::now());
        foreign.guild_id = 99;

        store.set(&item(1, 2, Utc::now())).await.expect("set");
        store.set(&foreign).await.expect("set");

        store
            .delete_for_guild(serenity::GuildId::new(10))
            .await
            .expect("purge");

        let remaining = store.all().await.expect("all");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].guild_id, 99);
    }
}
