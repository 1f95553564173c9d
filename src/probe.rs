//! Encoded bitrate lookup through `sox --i -B`.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

lazy_static! {
    static ref BITRATE_RE: Regex = Regex::new(r"^(\d+(?:\.\d+)?)\s*([kKmM]?)$")
        .expect("Bitrate regex should compile");
}

/// Determines the bitrate (bits/sec) a source should be paced at.
///
/// Implementations never fail: anything that goes wrong is logged and
/// answered with a fallback value.
#[async_trait]
pub trait BitrateProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> u32;
}

pub struct SoxProbe {
    sox_path: PathBuf,
    fallback: u32,
}

impl SoxProbe {
    pub fn new(sox_path: impl Into<PathBuf>, fallback: u32) -> Self {
        Self {
            sox_path: sox_path.into(),
            fallback,
        }
    }

    async fn run(&self, path: &Path) -> anyhow::Result<u32> {
        let output = Command::new(&self.sox_path)
            .arg("--i")
            .arg("-B")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            anyhow::bail!("{}", stderr.trim());
        }
        if !output.status.success() {
            anyhow::bail!("exited with {}", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_bitrate(&stdout)
            .ok_or_else(|| anyhow::anyhow!("unparsable bitrate {:?}", stdout.trim()))
    }
}

#[async_trait]
impl BitrateProbe for SoxProbe {
    async fn probe(&self, path: &Path) -> u32 {
        match self.run(path).await {
            Ok(bitrate) => {
                debug!("Bitrate of {} is {bitrate} bps", path.display());
                bitrate
            }
            Err(e) => {
                error!(
                    "Failed to get bitrate of {}, using {} bps: {e:#}",
                    path.display(),
                    self.fallback
                );
                self.fallback
            }
        }
    }
}

/// Parses the human readable rate sox prints, e.g. `128k` or `1.41M`.
pub fn parse_bitrate(output: &str) -> Option<u32> {
    let captures = BITRATE_RE.captures(output.trim())?;
    let value: f64 = captures[1].parse().ok()?;
    let multiplier = match &captures[2] {
        "k" | "K" => 1_000.0,
        "m" | "M" => 1_000_000.0,
        _ => 1.0,
    };

    let bitrate = (value * multiplier).round();
    if bitrate < 1.0 || bitrate > u32::MAX as f64 {
        return None;
    }

    Some(bitrate as u32)
}
