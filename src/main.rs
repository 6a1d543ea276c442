pub use poise::serenity_prelude as serenity;

mod awards;
mod commands;
mod data;
mod error;
mod events;
mod log;
mod quake;
mod setup;
mod storage;
mod util;

pub use data::Data;
pub use error::ConfigError;
pub use error::SudachiError;
pub use error::UserError;
pub use setup::Config;

/// Convenient type alias for the only [poise::Context] type used here.
type Context<'a> = poise::Context<'a, Data, SudachiError>;

#[tokio::main]
async fn main() -> Result<(), SudachiError> {
    // Read config before tracing, the config decides where logs go.
    let config = Config::read()?;

    // Hold the file-writer guard until shutdown, dropping it flushes pending logs.
    let _guard = log::install_tracing(&config);

    let mut client = setup::client(config).await?;
    client.start().await?;

    Ok(())
}
