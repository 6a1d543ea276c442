//! Earthquake alert relay.
//!
//! Guilds register a channel and a minimum seismic intensity; a background
//! poll loop (see [feed]) watches the P2P地震情報 feed and relays every new
//! earthquake at or above a guild's threshold into its channel.

pub mod feed;

use chrono::DateTime;
use chrono::Utc;
use sqlx::FromRow;
use sqlx::SqlitePool;

use crate::serenity;
use crate::storage::ConfigRecord;
use crate::storage::ConfigStore;
use crate::storage::SqliteQuery;

/// Per-guild settings for the relay.
#[derive(Debug, Clone, FromRow)]
pub struct QuakeConfig {
    pub guild_id: i64,
    pub guild_name: String,
    /// Relay target, resolved by name at relay time.
    pub channel_name: String,
    /// JMA intensity scale code (10=震度1 … 70=震度7); quakes below it are
    /// not relayed to this guild.
    pub min_scale: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuakeConfig {
    pub fn new(
        guild_id: serenity::GuildId,
        guild_name: &str,
        channel_name: &str,
        min_scale: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            guild_id: guild_id.get() as i64,
            guild_name: guild_name.to_string(),
            channel_name: channel_name.to_string(),
            min_scale,
            created_at: now,
            updated_at: now,
        }
    }
}

impl ConfigRecord for QuakeConfig {
    const TABLE: &'static str = "quake_config";
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS quake_config (
        guild_id INTEGER PRIMARY KEY,
        guild_name TEXT NOT NULL,
        channel_name TEXT NOT NULL,
        min_scale INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )";
    const UPSERT: &'static str = "INSERT INTO quake_config
        (guild_id, guild_name, channel_name, min_scale, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(guild_id) DO UPDATE SET
            guild_name = excluded.guild_name,
            channel_name = excluded.channel_name,
            min_scale = excluded.min_scale,
            updated_at = excluded.updated_at";

    fn bind_upsert<'q>(&self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.guild_id)
            .bind(self.guild_name.clone())
            .bind(self.channel_name.clone())
            .bind(self.min_scale)
            .bind(self.created_at)
            .bind(self.updated_at)
    }
}

/// Everything the quake feature keeps on [crate::Data].
pub struct QuakeFeature {
    pub configs: ConfigStore<QuakeConfig>,
}

impl QuakeFeature {
    /// Wire the feature to its database file and create missing tables.
    pub async fn open(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        let configs = ConfigStore::new(pool);
        configs.init().await?;
        Ok(Self { configs })
    }
}

/// Display label for a JMA intensity scale code.
pub fn scale_label(scale: i64) -> &'static str {
    match scale {
        10 => "震度1",
        20 => "震度2",
        30 => "震度3",
        40 => "震度4",
        45 => "震度5弱",
        50 => "震度5強",
        55 => "震度6弱",
        60 => "震度6強",
        70 => "震度7",
        _ => "不明",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_labels_cover_the_jma_codes() {
        assert_eq!(scale_label(10), "震度1");
        assert_eq!(scale_label(45), "震度5弱");
        assert_eq!(scale_label(70), "震度7");
        assert_eq!(scale_label(-1), "不明");
    }
}
