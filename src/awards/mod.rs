//! Weekly reaction awards (リアクション大賞).
//!
//! Messages that collect reactions are tracked per guild; once a week, at a
//! configured weekday and time, the top-ranked messages of the past seven
//! days are announced in the configured channel.

pub mod report;
pub mod scheduler;
pub mod tally;

use chrono::DateTime;
use chrono::Datelike;
use chrono::Local;
use chrono::TimeDelta;
use chrono::Timelike;
use chrono::Utc;
use sqlx::FromRow;
use sqlx::SqlitePool;
use tracing::debug;

use crate::serenity;
use crate::storage::ConfigRecord;
use crate::storage::ConfigStore;
use crate::storage::MessageKey;
use crate::storage::RecordStore;
use crate::storage::SqliteQuery;
use crate::storage::TrackedMessage;
use crate::SudachiError;

pub use scheduler::AwardScheduler;
pub use scheduler::SchedulerContext;

/// Messages older than this are pruned and never enter the ranking.
pub const RETENTION_DAYS: i64 = 7;

/// Sent instead of a ranking when nothing met the threshold. Always sent,
/// a silent week would look like a broken scheduler.
pub const NOTHING_TO_REPORT: &str = "今週はリアクションが付いた投稿がありませんでした。";

/// Per-guild settings for the awards feature.
#[derive(Debug, Clone, FromRow)]
pub struct AwardsConfig {
    pub guild_id: i64,
    pub guild_name: String,
    /// Report target, resolved by name at cycle time.
    pub channel_name: String,
    /// Messages below this count are not ranked.
    pub min_reactions: i64,
    /// How many rank groups the report shows.
    pub rank_limit: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AwardsConfig {
    pub fn new(
        guild_id: serenity::GuildId,
        guild_name: &str,
        channel_name: &str,
        min_reactions: i64,
        rank_limit: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            guild_id: guild_id.get() as i64,
            guild_name: guild_name.to_string(),
            channel_name: channel_name.to_string(),
            min_reactions,
            rank_limit,
            created_at: now,
            updated_at: now,
        }
    }
}

impl ConfigRecord for AwardsConfig {
    const TABLE: &'static str = "awards_config";
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS awards_config (
        guild_id INTEGER PRIMARY KEY,
        guild_name TEXT NOT NULL,
        channel_name TEXT NOT NULL,
        min_reactions INTEGER NOT NULL,
        rank_limit INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )";
    const UPSERT: &'static str = "INSERT INTO awards_config
        (guild_id, guild_name, channel_name, min_reactions, rank_limit, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(guild_id) DO UPDATE SET
            guild_name = excluded.guild_name,
            channel_name = excluded.channel_name,
            min_reactions = excluded.min_reactions,
            rank_limit = excluded.rank_limit,
            updated_at = excluded.updated_at";

    fn bind_upsert<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.guild_id)
            .bind(self.guild_name.clone())
            .bind(self.channel_name.clone())
            .bind(self.min_reactions)
            .bind(self.rank_limit)
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

/// When the weekly report fires, one row per guild.
#[derive(Debug, Clone, FromRow)]
pub struct AwardSchedule {
    pub guild_id: i64,
    /// Days from Monday, 0..=6.
    pub weekday: i64,
    pub hour: i64,
    pub minute: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AwardSchedule {
    pub fn new(guild_id: serenity::GuildId, weekday: i64, hour: i64, minute: i64) -> Self {
        let now = Utc::now();
        Self {
            guild_id: guild_id.get() as i64,
            weekday,
            hour,
            minute,
            created_at: now,
            updated_at: now,
        }
    }

    /// Exact weekday/hour/minute match against local time. A minute missed
    /// while the process was down is simply not caught until next week.
    pub fn matches(&self, now: DateTime<Local>) -> bool {
        now.weekday().num_days_from_monday() as i64 == self.weekday
            && now.hour() as i64 == self.hour
            && now.minute() as i64 == self.minute
    }
}

impl ConfigRecord for AwardSchedule {
    const TABLE: &'static str = "award_schedule";
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS award_schedule (
        guild_id INTEGER PRIMARY KEY,
        weekday INTEGER NOT NULL,
        hour INTEGER NOT NULL,
        minute INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )";
    const UPSERT: &'static str = "INSERT INTO award_schedule
        (guild_id, weekday, hour, minute, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(guild_id) DO UPDATE SET
            weekday = excluded.weekday,
            hour = excluded.hour,
            minute = excluded.minute,
            updated_at = excluded.updated_at";

    fn bind_upsert<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.guild_id)
            .bind(self.weekday)
            .bind(self.hour)
            .bind(self.minute)
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

/// Everything the awards feature keeps on [crate::Data].
pub struct AwardsFeature {
    pub configs: ConfigStore<AwardsConfig>,
    pub schedules: ConfigStore<AwardSchedule>,
    pub records: RecordStore,
    pub scheduler: AwardScheduler,
}

impl AwardsFeature {
    /// Wire the feature to its database file and create missing tables.
    pub async fn open(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        let configs = ConfigStore::new(pool.clone());
        let schedules = ConfigStore::new(pool.clone());
        let records = RecordStore::new(pool);

        configs.init().await?;
        schedules.init().await?;
        records.init().await?;

        Ok(Self {
            configs,
            schedules,
            records,
            scheduler: AwardScheduler::new(),
        })
    }

    /// Drop everything this feature knows about a guild: timer, settings,
    /// schedule, and tracked messages. Used by `unregister` and when the bot
    /// is removed from the guild.
    pub async fn remove_guild(&self, guild_id: serenity::GuildId) -> Result<(), sqlx::Error> {
        self.scheduler.stop(guild_id).await;
        self.schedules.unregister(guild_id).await?;
        self.configs.unregister(guild_id).await?;
        self.records.delete_for_guild(guild_id).await?;
        Ok(())
    }
}

/// Re-count a message's reactions after a reaction add/remove and bring the
/// record store in line: upsert while the count is positive, delete at zero.
///
/// The count is re-read from the message itself and replaces the stored one
/// wholesale, so events arriving out of order cannot drift the total.
pub async fn refresh_tracked_message(
    ctx: &serenity::Context,
    feature: &AwardsFeature,
    reaction: &serenity::Reaction,
) -> Result<(), SudachiError> {
    // Reactions in DMs have no guild and are not tracked.
    let Some(guild_id) = reaction.guild_id else {
        return Ok(());
    };

    // Only guilds that registered the feature pay the message fetch.
    if feature.configs.get(guild_id).await?.is_none() {
        return Ok(());
    }

    let message = match reaction.channel_id.message(&ctx.http, reaction.message_id).await {
        Ok(message) => message,
        Err(err) => {
            // Message, channel, or guild may be gone; the weekly prune will
            // reclaim any stale row.
            debug!("Could not fetch reacted message {}: {err}", reaction.message_id);
            return Ok(());
        }
    };

    if message.author.bot {
        return Ok(());
    }

    let posted_at = DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0)
        .unwrap_or_else(Utc::now);
    if Utc::now() - posted_at > TimeDelta::days(RETENTION_DAYS) {
        return Ok(());
    }

    let key = MessageKey::new(guild_id, reaction.channel_id, reaction.message_id);
    let total: i64 = message.reactions.iter().map(|r| r.count as i64).sum();

    if total <= 0 {
        feature.records.delete(key).await?;
        return Ok(());
    }

    let guild_name = ctx
        .cache
        .guild(guild_id)
        .map(|guild| guild.name.clone())
        .unwrap_or_default();
    let channel_name = reaction.channel_id.name(ctx).await.unwrap_or_default();
    let author = message
        .author
        .global_name
        .clone()
        .unwrap_or_else(|| message.author.name.clone());

    let now = Utc::now();
    let item = TrackedMessage {
        guild_id: key.guild_id,
        channel_id: key.channel_id,
        message_id: key.message_id,
        guild_name,
        channel_name,
        content: message.content.clone(),
        author,
        url: message.link(),
        reactions_count: total,
        posted_at,
        created_at: now,
        updated_at: now,
    };
    feature.records.set(&item).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn schedule(weekday: i64, hour: i64, minute: i64) -> AwardSchedule {
        AwardSchedule::new(serenity::GuildId::new(1), weekday, hour, minute)
    }

    #[test]
    fn schedule_matches_only_the_exact_minute() {
        // 2024-01-01 is a Monday.
        let monday_nine = Local.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();

        assert!(schedule(0, 9, 30).matches(monday_nine));
        assert!(!schedule(0, 9, 31).matches(monday_nine));
        assert!(!schedule(0, 10, 30).matches(monday_nine));
        assert!(!schedule(1, 9, 30).matches(monday_nine));
    }

    #[test]
    fn schedule_matches_any_second_within_the_minute() {
        let late_in_minute = Local.with_ymd_and_hms(2024, 1, 1, 9, 30, 59).unwrap();
        assert!(schedule(0, 9, 30).matches(late_in_minute));
    }
}
