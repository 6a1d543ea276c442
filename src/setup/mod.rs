//! Bot construction: config file, storage, serenity client, poise framework.

mod config;
mod framework;

use crate::serenity;
use crate::SudachiError;

pub use config::Config;

/// Constructs a [serenity::Client] running the poise framework.
pub(super) async fn client(config: Config) -> Result<serenity::Client, SudachiError> {
    // Get discord token from config file
    let token = config.token()?.clone();

    // Intents we wish to use
    // See https://discord.com/developers/docs/topics/gateway#gateway-intents
    let intents = serenity::GatewayIntents::non_privileged();

    let client = serenity::ClientBuilder::new(token, intents)
        .framework(framework::framework(config))
        .await?;

    Ok(client)
}
