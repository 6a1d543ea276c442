//! Gateway event dispatch.
//!
//! Commands go through poise; everything else the bot reacts to arrives
//! here. A failing handler is reported through the framework's error hook
//! and never takes the gateway loop down with it.

use tracing::info;

use crate::awards;
use crate::serenity;
use crate::Data;
use crate::SudachiError;

pub async fn handle(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, SudachiError>,
    data: &Data,
) -> Result<(), SudachiError> {
    match event {
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            awards::refresh_tracked_message(ctx, &data.awards, add_reaction).await
        }
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            awards::refresh_tracked_message(ctx, &data.awards, removed_reaction).await
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            // An unavailable guild is an outage, not a removal.
            if incomplete.unavailable {
                return Ok(());
            }
            let guild_id = incomplete.id;
            info!("Removed from guild {guild_id}, dropping its settings.");
            data.awards.remove_guild(guild_id).await?;
            data.quake.configs.unregister(guild_id).await?;
            Ok(())
        }
        _ => Ok(()),
    }
}
