//! Test infrastructure for splicecast integration tests.
//!
//! Provides stand-ins for the external sox program, temporary audio
//! fixtures and a listener that records everything it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::FutureExt;
use std::{
    io::Cursor,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub use splicecast::config::{AfterMerge, Config};
pub use splicecast::controller::PipelineState;
pub use splicecast::error::CommandError;
pub use splicecast::mixer::{AudioMixer, MergedSource, Volumes};
pub use splicecast::pacer::ByteSource;
pub use splicecast::probe::BitrateProbe;
pub use splicecast::registry::SubscriberId;
pub use splicecast::Station;

/// 100_000 bytes per second, released in 10_000 byte chunks
pub const TEST_BITRATE: u32 = 800_000;
pub const CHUNK_SIZE: usize = 10_000;
pub const BASE_LEN: usize = 400_000;
pub const FX_LEN: usize = 5_000;

/// Marker byte used for effect audio, never present in the base pattern
pub const FX_BYTE: u8 = 0xFF;

/// Base source content: a counting pattern, so any gap or repetition is visible.
pub fn base_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Probe that always answers with the same bitrate.
pub struct FixedProbe(pub u32);

#[async_trait]
impl BitrateProbe for FixedProbe {
    async fn probe(&self, _path: &Path) -> u32 {
        self.0
    }
}

/// Mixer stand-in: plays the effect file verbatim, then hands the untouched
/// live source back as the remainder.
#[derive(Default)]
pub struct StubMixer {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl StubMixer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioMixer for StubMixer {
    async fn merge(
        &self,
        base: ByteSource,
        effect: &Path,
        _volumes: Volumes,
    ) -> anyhow::Result<MergedSource> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            anyhow::bail!("mixer unavailable");
        }

        let effect = tokio::fs::read(effect).await?;

        Ok(MergedSource {
            output: Box::new(Cursor::new(effect)),
            remainder: async move { Some(base) }.boxed(),
        })
    }
}

/// Station wired to temporary audio files and test doubles.
pub struct TestStation {
    pub station: Station,
    pub mixer: Arc<StubMixer>,
    pub dir: TempDir,
}

impl TestStation {
    pub fn new() -> Self {
        Self::build(AfterMerge::Resume, StubMixer::default())
    }

    pub fn with_policy(policy: AfterMerge) -> Self {
        Self::build(policy, StubMixer::default())
    }

    pub fn with_mixer(mixer: StubMixer) -> Self {
        Self::build(AfterMerge::Resume, mixer)
    }

    /// Station running the real probe and mixer against a shell script
    /// standing in for sox.
    pub fn with_sox(script: &str) -> Self {
        let (dir, mut config) = fixtures(AfterMerge::Resume);
        config.sox.sox_path = write_script(dir.path(), "sox", script);

        Self {
            station: Station::from_config(config),
            mixer: Arc::new(StubMixer::default()),
            dir,
        }
    }

    fn build(policy: AfterMerge, mixer: StubMixer) -> Self {
        let (dir, config) = fixtures(policy);
        let mixer = Arc::new(mixer);
        let station = Station::new(config, Arc::new(FixedProbe(TEST_BITRATE)), mixer.clone());

        Self {
            station,
            mixer,
            dir,
        }
    }

    pub fn fx_path(&self, name: &str) -> PathBuf {
        self.station.config().stream.fx_directory.join(name)
    }
}

/// Writes the base source and two effects into a fresh directory.
fn fixtures(policy: AfterMerge) -> (TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let base_source = dir.path().join("conversation.mp3");
    let fx_directory = dir.path().join("fx");

    std::fs::write(&base_source, base_pattern(BASE_LEN)).unwrap();
    std::fs::create_dir(&fx_directory).unwrap();
    for name in ["Laughing Crowd.mp3", "Boo! Sound Effect.mp3"] {
        std::fs::write(fx_directory.join(name), vec![FX_BYTE; FX_LEN]).unwrap();
    }

    let mut config = Config::default();
    config.stream.base_source = base_source;
    config.stream.fx_directory = fx_directory;
    config.stream.after_merge = policy;

    (dir, config)
}

pub fn write_script(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Subscribes a listener and records every chunk it receives.
pub struct Recorder {
    pub id: SubscriberId,
    chunks: Arc<Mutex<Vec<Vec<u8>>>>,
    task: JoinHandle<()>,
}

impl Recorder {
    pub fn subscribe(station: &Station) -> Self {
        let mut listener = station.subscribe();
        let id = listener.id();
        let chunks = Arc::new(Mutex::new(vec![]));

        let task = {
            let chunks = chunks.clone();
            tokio::spawn(async move {
                while let Some(chunk) = listener.recv().await {
                    chunks.lock().unwrap().push(chunk.to_vec());
                }
            })
        };

        Self { id, chunks, task }
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.chunks().concat()
    }

    pub fn len(&self) -> usize {
        self.chunks().iter().map(Vec::len).sum()
    }

    /// Disconnects the listener, as a closed HTTP connection would.
    pub async fn disconnect(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// Asserts that `bytes` is an uninterrupted prefix of the base pattern.
pub fn assert_base_prefix(bytes: &[u8]) {
    let expected = base_pattern(bytes.len());
    if let Some(pos) = bytes.iter().zip(&expected).position(|(a, b)| a != b) {
        panic!("base stream broken at byte {pos} of {}", bytes.len());
    }
}

/// Splits a recording into (before effect, effect, after effect).
pub fn split_at_effect(bytes: &[u8]) -> (&[u8], &[u8], &[u8]) {
    let start = bytes
        .iter()
        .position(|&b| b == FX_BYTE)
        .expect("effect audio should have been played");
    let end = bytes[start..]
        .iter()
        .position(|&b| b != FX_BYTE)
        .map(|len| start + len)
        .unwrap_or(bytes.len());

    (&bytes[..start], &bytes[start..end], &bytes[end..])
}

pub async fn wait(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
