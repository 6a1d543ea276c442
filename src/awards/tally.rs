//! Ranking of tracked messages by reaction count.
//!
//! Pure functions over a snapshot of the record store; the scheduler feeds
//! them and the report composer consumes the result.

use itertools::Itertools;

use crate::serenity;
use crate::storage::TrackedMessage;

/// Messages tied at one reaction count, sharing a place in the ranking.
#[derive(Debug)]
pub struct RankGroup {
    /// Competition-style place: ties share it, the next distinct count
    /// advances by the size of the tie group.
    pub rank: usize,
    pub reactions: i64,
    pub items: Vec<TrackedMessage>,
}

/// Rank one guild's messages from a full snapshot.
///
/// Messages of other guilds and messages below `min_reactions` are dropped,
/// the rest are grouped by exact count and sorted descending. At most
/// `rank_limit` distinct count groups are returned; a tie occupies a single
/// group but advances the following group's rank by its size.
pub fn rank_messages(
    items: Vec<TrackedMessage>,
    guild_id: serenity::GuildId,
    min_reactions: i64,
    rank_limit: usize,
) -> Vec<RankGroup> {
    let guild = guild_id.get() as i64;

    let mut grouped = items
        .into_iter()
        .filter(|item| item.guild_id == guild)
        .filter(|item| item.reactions_count >= min_reactions)
        .map(|item| (item.reactions_count, item))
        .into_group_map();

    let mut counts: Vec<i64> = grouped.keys().copied().collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));

    let mut rank = 1;
    let mut groups = Vec::new();
    for count in counts.into_iter().take(rank_limit) {
        let mut members = grouped.remove(&count).unwrap_or_default();
        // Oldest first within a tie, so the output is stable across runs.
        members.sort_by_key(|item| item.posted_at);

        let width = members.len();
        groups.push(RankGroup {
            rank,
            reactions: count,
            items: members,
        });
        rank += width;
    }

    groups
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn item(guild_id: i64, message_id: i64, count: i64) -> TrackedMessage {
        let now = Utc::now();
        TrackedMessage {
            guild_id,
            channel_id: 20,
            message_id,
            guild_name: "guild".to_string(),
            channel_name: "general".to_string(),
            content: "hello".to_string(),
            author: "author".to_string(),
            url: String::new(),
            reactions_count: count,
            posted_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn guild() -> serenity::GuildId {
        serenity::GuildId::new(10)
    }

    #[test]
    fn ties_share_a_group_and_the_limit_counts_groups() {
        let items = vec![
            item(10, 1, 10),
            item(10, 2, 10),
            item(10, 3, 7),
            item(10, 4, 5),
        ];

        let groups = rank_messages(items, guild(), 1, 2);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].reactions, 10);
        assert_eq!(groups[0].items.len(), 2);
        assert_eq!(groups[1].reactions, 7);
        assert_eq!(groups[1].items.len(), 1);
    }

    #[test]
    fn rank_advances_by_tie_group_size() {
        let items = vec![item(10, 1, 9), item(10, 2, 9), item(10, 3, 6)];

        let groups = rank_messages(items, guild(), 5, 3);

        assert_eq!(groups[0].rank, 1);
        assert_eq!(groups[1].rank, 3);
    }

    #[test]
    fn below_threshold_items_are_dropped() {
        let items = vec![item(10, 1, 9), item(10, 2, 4)];

        let groups = rank_messages(items, guild(), 5, 3);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].reactions, 9);
    }

    #[test]
    fn other_guilds_are_invisible() {
        let items = vec![item(10, 1, 9), item(99, 2, 50)];

        let groups = rank_messages(items, guild(), 1, 3);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].reactions, 9);
    }

    #[test]
    fn nothing_over_threshold_yields_an_empty_ranking() {
        let items = vec![item(10, 1, 2)];
        assert!(rank_messages(items, guild(), 5, 3).is_empty());
    }
}
