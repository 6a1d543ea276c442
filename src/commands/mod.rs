//! Bot commands.

mod awards;
mod quake;

use crate::Data;
use crate::SudachiError;

/// Convenient type alias for [poise::Command].
pub type Command = poise::Command<Data, SudachiError>;

/// Lists all the implemented commands
pub fn list() -> Vec<Command> {
    vec![awards::awards(), quake::quake()]
}
