//! Errors surfaced to whoever issued a command.

use std::path::PathBuf;
use thiserror::Error;

/// Failure acknowledgment for a `start`, `stop` or effect command
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("effect not found: {0}")]
    EffectNotFound(String),

    #[error("failed to open source {}: {source}", path.display())]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("nothing is playing")]
    NotPlaying,

    #[error("unknown command: {0:?}")]
    UnknownCommand(String),
}

pub type CommandResult = Result<(), CommandError>;
