use crate::error::CommandError;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start streaming the base source
    Start,

    /// Stop streaming
    Stop,

    /// Splice the named effect into the stream
    Effect(String),
}

impl Command {
    pub fn parse(input: &str) -> Result<Command, CommandError> {
        let command = input.trim().to_lowercase();

        if command.is_empty() {
            Err(CommandError::UnknownCommand(input.to_string()))
        } else if command.contains("start") {
            Ok(Command::Start)
        } else if command.contains("stop") {
            Ok(Command::Stop)
        } else {
            Ok(Command::Effect(command))
        }
    }
}

/// Finds the first file in `fx_directory` whose name contains `name`,
/// ignoring case.
pub async fn resolve_effect(fx_directory: &Path, name: &str) -> Result<PathBuf, CommandError> {
    let needle = name.to_lowercase();
    let not_found = || CommandError::EffectNotFound(name.to_string());

    let mut entries = match tokio::fs::read_dir(fx_directory).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                "Failed to list effect directory {}: {e}",
                fx_directory.display()
            );
            return Err(not_found());
        }
    };

    let mut candidates = vec![];
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let is_file = entry
                    .file_type()
                    .await
                    .map(|file_type| file_type.is_file())
                    .unwrap_or(false);
                if is_file {
                    candidates.push(entry.file_name());
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error while listing {}: {e}", fx_directory.display());
                break;
            }
        }
    }
    candidates.sort();

    candidates
        .into_iter()
        .find(|file_name| file_name.to_string_lossy().to_lowercase().contains(&needle))
        .map(|file_name| fx_directory.join(file_name))
        .ok_or_else(not_found)
}
