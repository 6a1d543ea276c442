//! Turns a ranking into Discord messages.
//!
//! The first rank group goes out as the primary channel message; if more
//! groups follow, a continuation thread is opened on that message and the
//! rest are posted there. Discord caps embeds at ten per message, so large
//! tie groups are split across sequential sends.

use tracing::error;
use tracing::warn;

use super::tally::RankGroup;
use crate::serenity;
use crate::storage::TrackedMessage;

/// Transport limit on rich-content blocks per message.
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

/// Title of the thread holding everything past the first rank group.
pub const CONTINUATION_THREAD_TITLE: &str = "リアクション大賞 続き";

/// One rank group rendered for sending: a heading plus one embed per message.
pub struct ReportBlock {
    pub title: String,
    pub embeds: Vec<serenity::CreateEmbed>,
}

/// Render rank groups into sendable blocks, in ranking order.
pub fn compose(groups: &[RankGroup]) -> Vec<ReportBlock> {
    groups
        .iter()
        .enumerate()
        .map(|(index, group)| ReportBlock {
            title: block_title(index, group.reactions),
            embeds: group.items.iter().map(message_embed).collect(),
        })
        .collect()
}

/// The leading group is "the most", every following group is numbered by its
/// position in the ranking.
fn block_title(index: usize, reactions: i64) -> String {
    if index == 0 {
        format!("🏆 今週最も多くのリアクションを集めた投稿です！（{reactions}リアクション）")
    } else {
        format!(
            "{}番目に多くのリアクションを集めた投稿です（{reactions}リアクション）",
            index + 1
        )
    }
}

fn message_embed(item: &TrackedMessage) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .author(serenity::CreateEmbedAuthor::new(item.author.clone()))
        .description(item.content.clone())
        .field("リアクション数", item.reactions_count.to_string(), true)
        .field("リンク", item.url.clone(), true)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "#{}",
            item.channel_name
        )));

    if let Ok(posted) = serenity::Timestamp::from_unix_timestamp(item.posted_at.timestamp()) {
        embed = embed.timestamp(posted);
    }

    embed
}

/// Split one block's embeds into message-sized batches, order preserved.
fn message_batches(block: &ReportBlock) -> impl Iterator<Item = &[serenity::CreateEmbed]> {
    block.embeds.chunks(MAX_EMBEDS_PER_MESSAGE)
}

/// Deliver a composed report to a channel.
///
/// Every send is independently fallible: a failed chunk is logged and
/// skipped, its siblings still go out, and the caller's schedule is never
/// affected. When the primary message cannot be posted at all there is
/// nothing to anchor a thread on, so continuation blocks are dropped.
pub async fn deliver(
    http: &serenity::Http,
    channel_id: serenity::ChannelId,
    blocks: Vec<ReportBlock>,
) {
    let mut blocks = blocks.into_iter();
    let Some(first) = blocks.next() else {
        return;
    };

    let mut primary: Option<serenity::Message> = None;
    for (index, batch) in message_batches(&first).enumerate() {
        let mut message = serenity::CreateMessage::new().embeds(batch.to_vec());
        if index == 0 {
            message = message.content(first.title.clone());
        }
        match channel_id.send_message(http, message).await {
            Ok(sent) => {
                if primary.is_none() {
                    primary = Some(sent);
                }
            }
            Err(err) => error!("Failed to send report chunk to {channel_id}: {err}"),
        }
    }

    let remaining: Vec<ReportBlock> = blocks.collect();
    if remaining.is_empty() {
        return;
    }

    let Some(anchor) = primary else {
        warn!("Primary report message never went out; dropping continuation blocks.");
        return;
    };

    let thread = match channel_id
        .create_thread_from_message(
            http,
            anchor.id,
            serenity::CreateThread::new(CONTINUATION_THREAD_TITLE),
        )
        .await
    {
        Ok(thread) => thread,
        Err(err) => {
            error!("Failed to open continuation thread on {channel_id}: {err}");
            return;
        }
    };

    for block in remaining {
        for (index, batch) in message_batches(&block).enumerate() {
            let mut message = serenity::CreateMessage::new().embeds(batch.to_vec());
            if index == 0 {
                message = message.content(block.title.clone());
            }
            if let Err(err) = thread.id.send_message(http, message).await {
                error!("Failed to send report chunk to thread {}: {err}", thread.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn item(message_id: i64, count: i64) -> TrackedMessage {
        let now = Utc::now();
        TrackedMessage {
            guild_id: 10,
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

    fn group(rank: usize, reactions: i64, size: usize) -> RankGroup {
        RankGroup {
            rank,
            reactions,
            items: (0..size as i64).map(|id| item(id, reactions)).collect(),
        }
    }

    #[test]
    fn tie_at_the_top_titles_the_second_group_as_number_two() {
        // Two messages tied at 9 reactions, one at 6: the tie occupies the
        // first two rank slots but the following block is still titled 2番目.
        let groups = vec![group(1, 9, 2), group(3, 6, 1)];

        let blocks = compose(&groups);

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].title.contains("最も多く"));
        assert!(blocks[0].title.contains("9リアクション"));
        assert_eq!(blocks[0].embeds.len(), 2);
        assert!(blocks[1].title.starts_with("2番目"));
        assert_eq!(blocks[1].embeds.len(), 1);
    }

    #[test]
    fn oversized_group_splits_into_ordered_batches() {
        let blocks = compose(&[group(1, 5, 23)]);

        let sizes: Vec<usize> = message_batches(&blocks[0]).map(|batch| batch.len()).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
    }

    #[test]
    fn batches_never_exceed_the_transport_cap() {
        for size in [1, 9, 10, 11, 30] {
            let blocks = compose(&[group(1, 5, size)]);
            assert!(message_batches(&blocks[0]).all(|b| b.len() <= MAX_EMBEDS_PER_MESSAGE));
        }
    }
}
