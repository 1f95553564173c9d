use crate::constants::{CONFIG_FILE, FALLBACK_BITRATE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::read_to_string;

/// What the pipeline does once a merged segment runs out of output.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AfterMerge {
    /// Keep playing whatever part of the base source the mixer did not consume
    #[default]
    Resume,

    /// Leave the pipeline silent until the next command
    End,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub listen_addr: String,
    pub base_source: PathBuf,
    pub fx_directory: PathBuf,
    pub fallback_bitrate: u32,
    pub after_merge: AfterMerge,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            listen_addr: "0.0.0.0:3000".to_string(),
            base_source: PathBuf::from("audio/songs/conversation.mp3"),
            fx_directory: PathBuf::from("audio/fx"),
            fallback_bitrate: FALLBACK_BITRATE,
            after_merge: AfterMerge::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SoxConfig {
    /// Path or name of the sox binary
    pub sox_path: PathBuf,

    /// Value passed to `-t` for every mixer input and the output
    pub media_type: String,

    /// Volume applied to the live source during a merge
    pub song_volume: f32,

    /// Volume applied to the effect during a merge
    pub fx_volume: f32,
}

impl Default for SoxConfig {
    fn default() -> Self {
        SoxConfig {
            sox_path: PathBuf::from("sox"),
            media_type: "mp3".to_string(),
            song_volume: 0.99,
            fx_volume: 0.1,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub stream: StreamConfig,

    #[serde(flatten)]
    pub sox: SoxConfig,
}

pub async fn load(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config = read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse(&config).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse(config: &str) -> Result<Config> {
    let config: Config = toml::from_str(config)?;

    Ok(config)
}

/// Loads `Config.toml`, falling back to defaults when the file does not exist.
pub async fn load_or_default() -> Result<Config> {
    match tokio::fs::metadata(CONFIG_FILE).await {
        Ok(_) => load(CONFIG_FILE).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No {CONFIG_FILE} found, falling back to default config.");
            Ok(Config::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to stat {CONFIG_FILE}")),
    }
}
