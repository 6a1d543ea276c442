//! Implements the `/quake` command group.
//!
//! Registration and status of the earthquake alert relay. The poll loop
//! reads the config table on every quake, so changes take effect without
//! restarting anything.

use poise::ChoiceParameter;
use tracing::instrument;

use crate::quake::scale_label;
use crate::quake::QuakeConfig;
use crate::serenity;
use crate::Context;
use crate::SudachiError;
use crate::UserError;

/// 通知する最小震度。
#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ScaleChoice {
    #[name = "震度1以上"]
    Scale1,
    #[name = "震度2以上"]
    Scale2,
    #[name = "震度3以上"]
    Scale3,
    #[name = "震度4以上"]
    Scale4,
    #[name = "震度5弱以上"]
    Scale5Lower,
    #[name = "震度5強以上"]
    Scale5Upper,
    #[name = "震度6弱以上"]
    Scale6Lower,
    #[name = "震度6強以上"]
    Scale6Upper,
    #[name = "震度7のみ"]
    Scale7,
}

impl ScaleChoice {
    fn code(self) -> i64 {
        match self {
            Self::Scale1 => 10,
            Self::Scale2 => 20,
            Self::Scale3 => 30,
            Self::Scale4 => 40,
            Self::Scale5Lower => 45,
            Self::Scale5Upper => 50,
            Self::Scale6Lower => 55,
            Self::Scale6Upper => 60,
            Self::Scale7 => 70,
        }
    }
}

/// 地震速報の通知設定を管理します。
#[poise::command(
    slash_command,
    guild_only,
    subcommands("register", "unregister", "update", "status"),
    subcommand_required
)]
pub async fn quake(_ctx: Context<'_>) -> Result<(), SudachiError> {
    Ok(())
}

/// 地震速報の通知を登録します。
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn register(
    ctx: Context<'_>,
    #[description = "速報を投稿するチャンネル"] channel: serenity::ChannelId,
    #[description = "通知する最小震度"] min_scale: ScaleChoice,
) -> Result<(), SudachiError> {
    ctx.defer().await?;

    let guild_id = ctx.guild_id().ok_or(UserError::NotInGuild)?;
    let guild_name = ctx.guild().ok_or(UserError::NotInGuild)?.name.clone();
    let channel_name = channel.name(ctx).await?;

    ctx.data()
        .quake
        .configs
        .register(&QuakeConfig::new(
            guild_id,
            &guild_name,
            &channel_name,
            min_scale.code(),
        ))
        .await?;

    ctx.say(format!(
        "地震速報の通知を設定しました。{}の地震を #{channel_name} に投稿します。",
        min_scale.name()
    ))
    .await?;

    Ok(())
}

/// 地震速報の通知設定を部分的に変更します。
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn update(
    ctx: Context<'_>,
    #[description = "速報を投稿するチャンネル"] channel: Option<serenity::ChannelId>,
    #[description = "通知する最小震度"] min_scale: Option<ScaleChoice>,
) -> Result<(), SudachiError> {
    ctx.defer().await?;

    let guild_id = ctx.guild_id().ok_or(UserError::NotInGuild)?;
    let guild_name = ctx.guild().ok_or(UserError::NotInGuild)?.name.clone();

    let configs = &ctx.data().quake.configs;
    let config = configs
        .get(guild_id)
        .await?
        .ok_or(UserError::NotRegistered)?;

    let channel_name = match channel {
        Some(channel) => channel.name(ctx).await?,
        None => config.channel_name.clone(),
    };

    configs
        .register(&QuakeConfig::new(
            guild_id,
            &guild_name,
            &channel_name,
            min_scale.map_or(config.min_scale, ScaleChoice::code),
        ))
        .await?;

    ctx.say("地震速報の通知設定を更新しました。").await?;

    Ok(())
}

/// 地震速報の通知設定を削除します。
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn unregister(ctx: Context<'_>) -> Result<(), SudachiError> {
    ctx.defer().await?;

    let guild_id = ctx.guild_id().ok_or(UserError::NotInGuild)?;
    let configs = &ctx.data().quake.configs;

    if configs.get(guild_id).await?.is_none() {
        return Err(UserError::NotRegistered.into());
    }

    configs.unregister(guild_id).await?;
    ctx.say("地震速報の通知設定を削除しました。").await?;

    Ok(())
}

/// 地震速報の現在の通知設定を表示します。
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only)]
pub async fn status(ctx: Context<'_>) -> Result<(), SudachiError> {
    let guild_id = ctx.guild_id().ok_or(UserError::NotInGuild)?;

    let config = ctx
        .data()
        .quake
        .configs
        .get(guild_id)
        .await?
        .ok_or(UserError::NotRegistered)?;

    let embed = serenity::CreateEmbed::new()
        .title("地震速報の通知設定")
        .field("投稿チャンネル", format!("#{}", config.channel_name), true)
        .field("最小震度", scale_label(config.min_scale), true);

    let reply = poise::CreateReply::default().embed(embed).ephemeral(true);
    ctx.send(reply).await?;

    Ok(())
}
