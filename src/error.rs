//! Error types for the whole bot.
//!
//! [UserError] covers everything a user can cause and is always shown back to
//! them instead of being logged as a failure. [SudachiError] is the command
//! and event error type; [ConfigError] only exists while reading the config
//! file, before tracing is even installed.

use thiserror::Error;

use crate::serenity;

/// Errors caused by user input. Shown to the invoking user, never treated as
/// a bot failure.
#[derive(Error, Debug)]
pub enum UserError {
    #[error("サーバー内でのみ使用できるコマンドです。")]
    NotInGuild,
    #[error("このサーバーではまだ登録されていません。先に `register` を実行してください。")]
    NotRegistered,
    #[error("Missing subcommand. Expected one of: {subcmds}")]
    MissingSubcommand {
        /// Comma separated list of valid subcommands.
        subcmds: String,
    },
    #[error("Could not parse arguments: '{input}'")]
    BadArgs {
        /// The raw input that failed to parse.
        input: String,
    },
    #[error("On cooldown, retry in {} seconds.", remaining.as_secs())]
    OnCooldown {
        /// Time until the command may be used again.
        remaining: std::time::Duration,
    },
    #[error("The bot is missing permissions: {missing}")]
    MissingBotPermissions {
        /// The permissions the bot lacks.
        missing: serenity::Permissions,
    },
    #[error("You are missing permissions: {missing:?}")]
    MissingUserPermissions {
        /// The permissions the user lacks, if known.
        missing: Option<serenity::Permissions>,
    },
    #[error("Only the bot owner may use this command.")]
    NotOwner,
}

/// Top level error type for commands, events, and scheduled jobs.
#[derive(Error, Debug)]
pub enum SudachiError {
    #[error(transparent)]
    UserError(#[from] UserError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Discord API error: {0}")]
    Serenity(#[from] serenity::Error),
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("channel '{name}' not found in guild '{guild}'")]
    ChannelNotFound {
        /// The configured channel name that failed to resolve.
        name: String,
        /// Guild the lookup ran against.
        guild: String,
    },
    #[error("command check failed{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    CheckFailed {
        /// Optional reason given by the failing check.
        reason: Option<String>,
    },
    #[error("command panicked{}", payload.as_deref().map(|p| format!(": {p}")).unwrap_or_default())]
    Panic {
        /// Panic payload, when it was a string.
        payload: Option<String>,
    },
    #[error("command structure mismatch: {description}")]
    CommandStructureMismatch {
        /// What discord sent that the bot no longer understands.
        description: String,
    },
}

/// Errors while reading or creating the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid config: {reason}")]
    InvalidConfig {
        /// What was wrong with the file contents.
        reason: String,
    },
    #[error("No config file found. {action_msg}")]
    MissingConfig {
        /// What the bot did about it (usually: wrote a default file).
        action_msg: String,
    },
    #[error("Filesystem error while reading config: {0}")]
    IoError(#[from] std::io::Error),
}
