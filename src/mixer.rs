//! Merging an effect into the live audio.
//!
//! The live source is streamed into an external program's stdin together
//! with the effect file, and the program's stdout becomes the new live
//! source.

use crate::{config::SoxConfig, pacer::ByteSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use std::{
    ffi::OsString,
    io::Cursor,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    process::Command,
};

const FEED_CHUNK_SIZE: usize = 16 * 1024;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Volumes {
    pub base: f32,
    pub effect: f32,
}

pub struct MergedSource {
    /// Merged audio
    pub output: ByteSource,

    /// Resolves once the mixer has exited, with whatever part of the base
    /// source it left unread. `None` when the base was fully consumed or the
    /// mixer failed.
    pub remainder: BoxFuture<'static, Option<ByteSource>>,
}

#[async_trait]
pub trait AudioMixer: Send + Sync {
    async fn merge(
        &self,
        base: ByteSource,
        effect: &Path,
        volumes: Volumes,
    ) -> Result<MergedSource>;
}

pub struct SoxMixer {
    sox_path: PathBuf,
    media_type: String,
}

impl SoxMixer {
    pub fn new(config: &SoxConfig) -> Self {
        Self {
            sox_path: config.sox_path.clone(),
            media_type: config.media_type.clone(),
        }
    }
}

#[async_trait]
impl AudioMixer for SoxMixer {
    async fn merge(
        &self,
        base: ByteSource,
        effect: &Path,
        volumes: Volumes,
    ) -> Result<MergedSource> {
        let mut child = Command::new(&self.sox_path)
            .args(merge_args(&self.media_type, effect, volumes))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.sox_path.display()))?;

        let stdin = child.stdin.take().context("Failed to get sox stdin")?;
        let stdout = child.stdout.take().context("Failed to get sox stdout")?;
        let stderr = child.stderr.take().context("Failed to get sox stderr")?;

        let effect_name = effect.display().to_string();
        let exit = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!("sox finished merging {effect_name}");
                    true
                }
                Ok(status) => {
                    error!(
                        "sox failed while merging {effect_name} (exit code {code})",
                        code = status.code().unwrap_or_default()
                    );
                    false
                }
                Err(e) => {
                    error!("Error while waiting for sox: {e}");
                    false
                }
            }
        });

        tokio::spawn(async move {
            // Print stderr to log
            let mut reader = tokio::io::BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!("sox stderr: {}", line);
            }
        });

        let feeder = tokio::spawn(feed(base, stdin));
        let remainder = async move {
            let rest = match feeder.await {
                Ok(rest) => rest,
                Err(e) => {
                    error!("Mixer input task failed: {e:?}");
                    None
                }
            };

            // A failed mix leaves the pipeline silent
            match exit.await {
                Ok(true) => rest,
                Ok(false) => None,
                Err(e) => {
                    error!("sox wait task failed: {e:?}");
                    None
                }
            }
        }
        .boxed();

        Ok(MergedSource {
            output: Box::new(stdout),
            remainder,
        })
    }
}

/// `sox -t <type> -v <base> -m - -t <type> -v <effect> <effect> -t <type> -`
pub fn merge_args(media_type: &str, effect: &Path, volumes: Volumes) -> Vec<OsString> {
    vec![
        "-t".into(),
        media_type.into(),
        "-v".into(),
        volumes.base.to_string().into(),
        "-m".into(),
        "-".into(),
        "-t".into(),
        media_type.into(),
        "-v".into(),
        volumes.effect.to_string().into(),
        effect.into(),
        "-t".into(),
        media_type.into(),
        "-".into(),
    ]
}

/// Copies `base` into the mixer input until either side ends.
///
/// Returns the unread rest of `base` when the mixer stopped accepting input
/// early, or `None` once `base` is exhausted.
pub async fn feed<W>(mut base: ByteSource, mut input: W) -> Option<ByteSource>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0; FEED_CHUNK_SIZE];

    loop {
        let read = match base.read(&mut buf).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) => {
                error!("Error while reading live source for mixer: {e}");
                break;
            }
        };

        if let Err(e) = input.write_all(&buf[..read]).await {
            warn!("Mixer stopped reading its input: {e}");
            buf.truncate(read);
            return Some(Box::new(Cursor::new(buf).chain(base)));
        }
    }

    if let Err(e) = input.shutdown().await {
        debug!("Error while closing mixer input: {e}");
    }

    None
}
