//! Logging functionality and error reporting.
//! The logging library of choice is [tracing].

use itertools::Itertools;
use poise::BoxFuture;
use poise::CreateReply;
use poise::FrameworkError;
use serenity::CreateMessage;
use tracing::debug;
use tracing::error;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::serenity;
use crate::Config;
use crate::Context;
use crate::Data;
use crate::SudachiError;
use crate::UserError;

/// The name of this crate, used to set filter target.
const THIS_CRATE: &str = env!("CARGO_CRATE_NAME");

/// Setup format layers, tracing subscribers, and installs tracing.
pub(super) fn install_tracing(config: &Config) -> Option<WorkerGuard> {
    // Uses local time.
    let timer = fmt::time::ChronoLocal::rfc_3339();

    // Set which traces are tracked.
    // By default, all INFO traces and above are shown; debug mode widens
    // this crate's own traces to DEBUG.
    let debug_mode = config.console_debug();
    let target = if debug_mode {
        Targets::new()
            .with_default(LevelFilter::INFO)
            .with_target(THIS_CRATE, LevelFilter::DEBUG)
    } else {
        Targets::new().with_default(LevelFilter::INFO)
    };

    // Compose the layer that prints traces to stdout.
    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_file(debug_mode)
        .with_level(true)
        .with_line_number(debug_mode)
        .with_target(true)
        .with_timer(timer.clone())
        .pretty()
        .with_filter(target.clone());

    // Compose the layer that writes logs and get a guard for the writer.
    let (log_layer, guard) = if config.logs_enabled() {
        // Put file logs in `log_dir` as "{THIS_CRATE}.log.{TIMESTAMP}" on an hourly basis.
        let prefix_format = format!("{THIS_CRATE}.log");
        let appender = tracing_appender::rolling::hourly(config.log_dir(), prefix_format);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer()
            .with_ansi(false)
            .with_file(debug_mode)
            .with_level(true)
            .with_line_number(debug_mode)
            .with_target(true)
            .with_timer(timer)
            .with_writer(writer)
            .compact()
            .with_filter(target);

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // Add all the layers and initialize them.
    tracing_subscriber::registry()
        .with(console_layer)
        .with(log_layer)
        .init();

    guard
}

/// Defines various behaviors for how to handle errors.
/// [UserError]s trigger an ephemeral reply; unexpected errors additionally
/// notify the configured notify list.
pub fn handle_framework_error(err: FrameworkError<Data, SudachiError>) -> BoxFuture<()> {
    let handler = async move {
        match err {
            // ---
            // This section includes all errors that should be invisible to users.
            // ---
            FrameworkError::Setup { error, .. } => error!("Error during startup: {error}"),
            FrameworkError::EventHandler { error, event, .. } => {
                error!(
                    "Error while handling '{}' event: {error}",
                    event.snake_case_name()
                )
            }

            // ---
            // This section includes errors that users see but are not logged as error!
            // For example, a user running `status` before registering gets told so,
            // but nothing unexpected happened.
            // ---
            FrameworkError::SubcommandRequired { ctx } => {
                let subcmds = ctx
                    .command()
                    .subcommands
                    .iter()
                    .map(|s| s.name.as_str())
                    .join(", ");
                let user_error = UserError::MissingSubcommand { subcmds };

                Response::builder()
                    .ctx(&ctx)
                    .reply(user_error.to_string())
                    .source(user_error)
                    .build()
                    .send()
                    .await;
            }
            // This branch specifically handles only errors that are UserError.
            // Other types are handled further below.
            FrameworkError::Command {
                error: SudachiError::UserError(user_error),
                ctx,
                ..
            } => {
                Response::builder()
                    .ctx(&ctx)
                    .reply(user_error.to_string())
                    .source(user_error)
                    .build()
                    .send()
                    .await;
            }
            FrameworkError::ArgumentParse {
                error, input, ctx, ..
            } => {
                let user_error = UserError::BadArgs {
                    input: input.unwrap_or_default(),
                };

                Response::builder()
                    .ctx(&ctx)
                    .reply(user_error.to_string())
                    .source(user_error)
                    .add_info(error.to_string())
                    .build()
                    .send()
                    .await;
            }
            FrameworkError::CooldownHit {
                remaining_cooldown,
                ctx,
                ..
            } => {
                let user_error = UserError::OnCooldown {
                    remaining: remaining_cooldown,
                };

                Response::builder()
                    .ctx(&ctx)
                    .reply(user_error.to_string())
                    .source(user_error)
                    .build()
                    .send()
                    .await;
            }
            FrameworkError::MissingBotPermissions {
                missing_permissions,
                ctx,
                ..
            } => {
                let user_error = UserError::MissingBotPermissions {
                    missing: missing_permissions,
                };

                Response::builder()
                    .ctx(&ctx)
                    .reply(user_error.to_string())
                    .source(user_error)
                    .build()
                    .send()
                    .await;
            }
            FrameworkError::MissingUserPermissions {
                missing_permissions,
                ctx,
                ..
            } => {
                let user_error = UserError::MissingUserPermissions {
                    missing: missing_permissions,
                };

                Response::builder()
                    .ctx(&ctx)
                    .reply(user_error.to_string())
                    .source(user_error)
                    .build()
                    .send()
                    .await;
            }
            FrameworkError::NotAnOwner { ctx, .. } => {
                let user_error = UserError::NotOwner;

                Response::builder()
                    .ctx(&ctx)
                    .reply(user_error.to_string())
                    .source(user_error)
                    .build()
                    .send()
                    .await;
            }
            FrameworkError::GuildOnly { ctx, .. } => {
                let user_error = UserError::NotInGuild;

                Response::builder()
                    .ctx(&ctx)
                    .reply(user_error.to_string())
                    .source(user_error)
                    .build()
                    .send()
                    .await;
            }
            FrameworkError::CommandCheckFailed { error, ctx, .. } => {
                let error = SudachiError::CheckFailed {
                    reason: error.map(|e| e.to_string()),
                };

                Response::builder()
                    .ctx(&ctx)
                    .reply(error.to_string())
                    .source(error)
                    .build()
                    .send()
                    .await;
            }

            // ---
            // This section includes errors that users see and are logged as error!
            // These are unexpected and should be fixed; all of them cause a bug
            // notification.
            // ---
            FrameworkError::Command { error, ctx, .. } => {
                Response::builder()
                    .ctx(&ctx)
                    .reply("何らかの問題が発生しました。開発者に報告済みです。")
                    .source(error)
                    .notify(true)
                    .is_error(true)
                    .build()
                    .send()
                    .await;
            }
            FrameworkError::CommandPanic { payload, ctx, .. } => {
                let error = SudachiError::Panic { payload };

                Response::builder()
                    .ctx(&ctx)
                    .reply("深刻な問題が発生しました。開発者に報告済みです。")
                    .source(error)
                    .notify(true)
                    .is_error(true)
                    .build()
                    .send()
                    .await;
            }
            FrameworkError::CommandStructureMismatch {
                description, ctx, ..
            } => {
                let error = SudachiError::CommandStructureMismatch {
                    description: description.to_string(),
                };

                Response::builder()
                    .ctx(&ctx.into())
                    .reply("コマンド定義が更新中です。しばらくしてからもう一度お試しください。")
                    .source(error)
                    .notify(true)
                    .is_error(true)
                    .build()
                    .send()
                    .await;
            }

            // ---
            // This section includes errors that should be unreachable.
            // No response is necessary but an error! log can be written.
            // ---
            FrameworkError::UnknownCommand { .. } => {
                error!("Prefix commands are not supported.")
            }
            FrameworkError::UnknownInteraction { interaction, .. } => {
                let name = &interaction.data.name;
                error!("Received unknown interaction: {name}")
            }
            FrameworkError::DynamicPrefix { .. } => {
                error!("Dynamic prefixes are not supported.")
            }
            _ => error!("The dev must have forgotten something..."),
        }
    };

    Box::pin(handler)
}

/// Sends an ephemeral reply to the [Context] author.
async fn ephemeral_reply(ctx: &Context<'_>, content: impl Into<String>) {
    let reply = CreateReply::default().ephemeral(true).content(content);
    if let Err(e) = ctx.send(reply).await {
        error!("Failed to send ephemeral reply. {e}")
    };
}

/// Sends a notification (via private message) to users in the notify list.
/// If a message fails, only log and don't retry.
async fn notify_bug(ctx: &Context<'_>, content: impl Into<String>) {
    let message = CreateMessage::new().content(content);

    let notify_list = &ctx.data().notify_list;
    for user in notify_list {
        if let Err(e) = user.direct_message(ctx, message.clone()).await {
            error!("Failed to send bug notification. {e}");
        }
    }
}

/// Helper function to create debug information from [Context]
fn debug_info(ctx: &Context) -> String {
    let user = &ctx.author().name;
    let cmd = &ctx.command().name;
    let user_input = ctx.invocation_string();
    format!("{user} tried to use {cmd} with {user_input}.")
}

/// Structured response to errors.
/// Always logs as at least [debug level](tracing::debug), but is upgraded to
/// [error level](tracing::error) if `is_error` is set.
/// Additionally, notify messages are accompanied by [debug info](debug_info).
#[derive(bon::Builder)]
#[builder(on(String, into))]
struct Response<'a> {
    /// The context of the response
    ctx: &'a Context<'a>,
    /// The reason for this reply, usually the error causing the response.
    #[builder(into)]
    source: SudachiError,
    /// Optional ephemeral reply to user.
    reply: Option<String>,
    /// Additional information to log
    add_info: Option<String>,
    /// Set to `true` to log as error.
    #[builder(default = false)]
    is_error: bool,
    /// Set to `true` to send notifications of the error.
    /// Does nothing if `is_error` is false.
    #[builder(default = false)]
    notify: bool,
}

impl Response<'_> {
    /// Execute the response
    async fn send(&self) {
        let ctx = self.ctx;

        let log_message = {
            let source = &self.source;
            let add_info = self
                .add_info
                .as_ref()
                // Map `None` to "" otherwise format it to be appended to another string.
                .map_or("".to_string(), |s| format!("| {s}"));
            format!("{source} {add_info}")
        };
        if self.is_error {
            error!("{log_message}");
            if self.notify {
                // Construct and send notification message
                let dbg_info = debug_info(ctx);
                let content = format!("Debug Info: {dbg_info}\n{log_message}");
                notify_bug(ctx, content).await;
            }
        } else {
            debug!("{log_message}");
        }

        // Send ephemeral reply if there is one.
        if let Some(ref reply) = self.reply {
            ephemeral_reply(ctx, reply).await;
        }
    }
}
