//! Setup for [poise::Framework]

use crate::awards::AwardsFeature;
use crate::commands;
use crate::error::ConfigError;
use crate::quake;
use crate::quake::QuakeFeature;
use crate::serenity;
use crate::storage;
use crate::Config;
use crate::Data;
use crate::SudachiError;

/// Convenient type alias, only this [poise::Framework] type is used.
type Framework = poise::Framework<Data, SudachiError>;

/// Construct a [poise::Framework]
pub(super) fn framework(config: Config) -> Framework {
    poise::Framework::builder()
        .options(framework_options())
        .setup(|ctx, rdy, fw| framework_setup(ctx, rdy, fw, config))
        .build()
}

/// Configure options for the [Framework]
fn framework_options() -> poise::FrameworkOptions<Data, SudachiError> {
    poise::FrameworkOptions {
        // Add commands to the framework
        commands: commands::list(),
        // Handle framework errors
        on_error: |e| crate::log::handle_framework_error(e),
        // Route gateway events (reactions, guild removals) to the features
        event_handler: |ctx, event, framework, data| {
            Box::pin(crate::events::handle(ctx, event, framework, data))
        },
        // Log when commands start
        pre_command: |ctx| {
            Box::pin(async move {
                let cmd_name = &ctx.command().name;
                let user = &ctx.author();
                tracing::info!("Started '{cmd_name}' command from {user}.")
            })
        },
        // Log when finishing commands
        post_command: |ctx| {
            Box::pin(async move {
                let cmd_name = &ctx.command().name;
                let user = &ctx.author();
                tracing::info!("Finished '{cmd_name}' command from {user}.")
            })
        },
        ..Default::default()
    }
}

/// Construct future that runs on startup
fn framework_setup<'a>(
    ctx: &'a serenity::Context,
    rdy: &'a serenity::Ready,
    fw: &'a Framework,
    config: Config,
) -> poise::BoxFuture<'a, Result<Data, SudachiError>> {
    Box::pin(async move {
        // Register the commands
        let commands = &fw.options().commands;
        let app_commands = poise::builtins::create_application_commands(commands);

        serenity::Command::set_global_commands(&ctx, app_commands.clone()).await?;
        if let Some(dev_guild) = config.dev_guild() {
            // This is faster than global registers, useful for development.
            tracing::info!("Registering commands on dev guild.");
            dev_guild.set_commands(ctx, app_commands).await?;
        }

        // Simple message that logs when the bot has initialized
        let bot_name = &rdy.user.name;
        tracing::info!("{bot_name} is ready!");

        // One database file per feature under the data directory.
        let data_dir = config.data_dir();
        std::fs::create_dir_all(data_dir).map_err(ConfigError::IoError)?;
        let awards = AwardsFeature::open(storage::open(data_dir, "awards").await?).await?;
        let quake_feature = QuakeFeature::open(storage::open(data_dir, "quake").await?).await?;

        let data = Data {
            notify_list: config.notify_list(fw),
            awards,
            quake: quake_feature,
        };

        // Bring persisted award schedules back to life.
        let scx = data.award_scheduler_context(ctx);
        for schedule in data.awards.schedules.records().await? {
            let guild_id = serenity::GuildId::new(schedule.guild_id as u64);
            if let Err(err) = data.awards.scheduler.start(scx.clone(), guild_id).await {
                tracing::error!("Failed to restore award schedule for guild {guild_id}: {err}");
            }
        }

        // The earthquake relay runs for the life of the process.
        tokio::spawn(quake::feed::poll_loop(
            ctx.http.clone(),
            ctx.cache.clone(),
            data.quake.configs.clone(),
            reqwest::Client::new(),
        ));

        Ok(data)
    })
}
