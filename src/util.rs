//! Small helpers shared across features.

use crate::serenity;

/// Look a channel up by name in the guild's channel cache.
///
/// Returns `None` when the guild is not cached or no channel carries that
/// name; callers treat both as "target unavailable right now".
pub fn resolve_channel_by_name(
    cache: &serenity::Cache,
    guild_id: serenity::GuildId,
    name: &str,
) -> Option<serenity::ChannelId> {
    let guild = cache.guild(guild_id)?;
    guild
        .channels
        .iter()
        .find(|(_, channel)| channel.name == name)
        .map(|(id, _)| *id)
}

/// Japanese weekday label for a days-from-Monday index.
pub fn weekday_label(days_from_monday: i64) -> &'static str {
    match days_from_monday {
        0 => "月曜日",
        1 => "火曜日",
        2 => "水曜日",
        3 => "木曜日",
        4 => "金曜日",
        5 => "土曜日",
        6 => "日曜日",
        _ => "不明",
    }
}
