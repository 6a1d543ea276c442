//! Implements the `/awards` command group.
//!
//! Registration, update, and status of the weekly reaction awards. Every
//! subcommand follows the same shape: defer, mutate the stores, confirm.

use tracing::instrument;

use crate::awards::AwardSchedule;
use crate::awards::AwardsConfig;
use crate::serenity;
use crate::util;
use crate::Context;
use crate::SudachiError;
use crate::UserError;

/// 発表の曜日。
#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum WeekdayChoice {
    #[name = "月曜日"]
    Monday,
    #[name = "火曜日"]
    Tuesday,
    #[name = "水曜日"]
    Wednesday,
    #[name = "木曜日"]
    Thursday,
    #[name = "金曜日"]
    Friday,
    #[name = "土曜日"]
    Saturday,
    #[name = "日曜日"]
    Sunday,
}

impl WeekdayChoice {
    fn days_from_monday(self) -> i64 {
        self as i64
    }
}

/// リアクション大賞の設定を管理します。
#[poise::command(
    slash_command,
    guild_only,
    subcommands("register", "unregister", "update", "status"),
    subcommand_required
)]
pub async fn awards(_ctx: Context<'_>) -> Result<(), SudachiError> {
    Ok(())
}

/// リアクション大賞を登録して、毎週の集計を開始します。
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn register(
    ctx: Context<'_>,
    #[description = "結果を投稿するチャンネル"] channel: serenity::ChannelId,
    #[description = "集計対象にする最小リアクション数"]
    #[min = 1]
    #[max = 100]
    min_reactions: u32,
    #[description = "発表する順位の数"]
    #[min = 1]
    #[max = 10]
    rank_limit: u32,
    #[description = "発表する曜日"] weekday: WeekdayChoice,
    #[description = "発表する時刻（時）"]
    #[min = 0]
    #[max = 23]
    hour: u32,
    #[description = "発表する時刻（分）"]
    #[min = 0]
    #[max = 59]
    minute: u32,
) -> Result<(), SudachiError> {
    ctx.defer().await?;

    let guild_id = ctx.guild_id().ok_or(UserError::NotInGuild)?;
    let guild_name = ctx.guild().ok_or(UserError::NotInGuild)?.name.clone();
    let channel_name = channel.name(ctx).await?;

    let feature = &ctx.data().awards;
    feature
        .configs
        .register(&AwardsConfig::new(
            guild_id,
            &guild_name,
            &channel_name,
            min_reactions as i64,
            rank_limit as i64,
        ))
        .await?;
    feature
        .schedules
        .register(&AwardSchedule::new(
            guild_id,
            weekday.days_from_monday(),
            hour as i64,
            minute as i64,
        ))
        .await?;
    feature
        .scheduler
        .start(
            ctx.data().award_scheduler_context(ctx.serenity_context()),
            guild_id,
        )
        .await?;

    ctx.say(format!(
        "リアクション大賞を設定しました。毎週{} {:02}:{:02} に #{channel_name} へ結果を投稿します。",
        util::weekday_label(weekday.days_from_monday()),
        hour,
        minute
    ))
    .await?;

    Ok(())
}

/// リアクション大賞の設定と集計データを削除します。
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn unregister(ctx: Context<'_>) -> Result<(), SudachiError> {
    ctx.defer().await?;

    let guild_id = ctx.guild_id().ok_or(UserError::NotInGuild)?;
    let feature = &ctx.data().awards;

    if feature.configs.get(guild_id).await?.is_none() {
        return Err(UserError::NotRegistered.into());
    }

    feature.remove_guild(guild_id).await?;
    ctx.say("リアクション大賞の設定を削除しました。").await?;

    Ok(())
}

/// リアクション大賞の設定を部分的に変更します。
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn update(
    ctx: Context<'_>,
    #[description = "結果を投稿するチャンネル"] channel: Option<serenity::ChannelId>,
    #[description = "集計対象にする最小リアクション数"]
    #[min = 1]
    #[max = 100]
    min_reactions: Option<u32>,
    #[description = "発表する順位の数"]
    #[min = 1]
    #[max = 10]
    rank_limit: Option<u32>,
    #[description = "発表する曜日"] weekday: Option<WeekdayChoice>,
    #[description = "発表する時刻（時）"]
    #[min = 0]
    #[max = 23]
    hour: Option<u32>,
    #[description = "発表する時刻（分）"]
    #[min = 0]
    #[max = 59]
    minute: Option<u32>,
) -> Result<(), SudachiError> {
    ctx.defer().await?;

    let guild_id = ctx.guild_id().ok_or(UserError::NotInGuild)?;
    let guild_name = ctx.guild().ok_or(UserError::NotInGuild)?.name.clone();

    let feature = &ctx.data().awards;
    let config = feature
        .configs
        .get(guild_id)
        .await?
        .ok_or(UserError::NotRegistered)?;
    let schedule = feature
        .schedules
        .get(guild_id)
        .await?
        .ok_or(UserError::NotRegistered)?;

    let channel_name = match channel {
        Some(channel) => channel.name(ctx).await?,
        None => config.channel_name.clone(),
    };

    feature
        .configs
        .register(&AwardsConfig::new(
            guild_id,
            &guild_name,
            &channel_name,
            min_reactions.map_or(config.min_reactions, |n| n as i64),
            rank_limit.map_or(config.rank_limit, |n| n as i64),
        ))
        .await?;
    feature
        .schedules
        .register(&AwardSchedule::new(
            guild_id,
            weekday.map_or(schedule.weekday, WeekdayChoice::days_from_monday),
            hour.map_or(schedule.hour, |h| h as i64),
            minute.map_or(schedule.minute, |m| m as i64),
        ))
        .await?;

    // The timer read its schedule at start, restart it on the new one.
    feature
        .scheduler
        .start(
            ctx.data().award_scheduler_context(ctx.serenity_context()),
            guild_id,
        )
        .await?;

    ctx.say("リアクション大賞の設定を更新しました。").await?;

    Ok(())
}

/// リアクション大賞の現在の設定を表示します。
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only)]
pub async fn status(ctx: Context<'_>) -> Result<(), SudachiError> {
    let guild_id = ctx.guild_id().ok_or(UserError::NotInGuild)?;
    let feature = &ctx.data().awards;

    let config = feature
        .configs
        .get(guild_id)
        .await?
        .ok_or(UserError::NotRegistered)?;
    let schedule = feature.schedules.get(guild_id).await?;
    let running = feature.scheduler.is_running(guild_id).await;

    let mut embed = serenity::CreateEmbed::new()
        .title("リアクション大賞の設定")
        .field("投稿チャンネル", format!("#{}", config.channel_name), true)
        .field("最小リアクション数", config.min_reactions.to_string(), true)
        .field("発表する順位の数", config.rank_limit.to_string(), true);

    if let Some(schedule) = schedule {
        embed = embed.field(
            "発表日時",
            format!(
                "毎週{} {:02}:{:02}",
                util::weekday_label(schedule.weekday),
                schedule.hour,
                schedule.minute
            ),
            true,
        );
    }
    embed = embed.field("集計タイマー", if running { "稼働中" } else { "停止中" }, true);

    let reply = poise::CreateReply::default().embed(embed).ephemeral(true);
    ctx.send(reply).await?;

    Ok(())
}
