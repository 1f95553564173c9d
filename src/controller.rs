//! The live pipeline: `source -> pacer -> broadcaster`.
//!
//! All structural changes (start, stop, splice) take the pipeline lock for
//! their whole duration, so two transitions never interleave and at most one
//! pacer is ever attached to a source feeding the broadcaster.

use crate::{
    broadcaster::Broadcaster,
    config::{AfterMerge, Config},
    error::{CommandError, CommandResult},
    mixer::{AudioMixer, MergedSource, Volumes},
    pacer::{empty_source, ByteSource, Pacer},
    probe::BitrateProbe,
};
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::{path::Path, sync::Arc};
use tokio::{
    fs::File,
    sync::{watch, Mutex},
};
use tokio_util::io::{ReaderStream, StreamReader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing feeds the broadcaster
    Idle,

    /// Base source is live
    Playing,

    /// An effect is being wired in
    Splicing,

    /// A merged source is live
    PlayingMerged,
}

struct Pipeline {
    state: watch::Sender<PipelineState>,
    bitrate: u32,
    pacer: Option<Pacer>,
}

impl Pipeline {
    fn set_state(&self, state: PipelineState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Pipeline state {previous:?} -> {state:?}");
        }
    }
}

#[derive(Clone)]
pub struct SpliceController {
    pipeline: Arc<Mutex<Pipeline>>,
    state: watch::Receiver<PipelineState>,
    broadcaster: Broadcaster,
    probe: Arc<dyn BitrateProbe>,
    mixer: Arc<dyn AudioMixer>,
    config: Arc<Config>,
}

impl SpliceController {
    pub fn new(
        config: Arc<Config>,
        broadcaster: Broadcaster,
        probe: Arc<dyn BitrateProbe>,
        mixer: Arc<dyn AudioMixer>,
    ) -> Self {
        let (tx, rx) = watch::channel(PipelineState::Idle);

        SpliceController {
            pipeline: Arc::new(Mutex::new(Pipeline {
                state: tx,
                bitrate: 0,
                pacer: None,
            })),
            state: rx,
            broadcaster,
            probe,
            mixer,
            config,
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    /// Bitrate the live pipeline is paced at, 0 when it has never started.
    pub async fn bitrate(&self) -> u32 {
        self.pipeline.lock().await.bitrate
    }

    /// Idle -> Playing. Starting a live pipeline is a no-op while it still
    /// has something to play; once its source has run out the base source is
    /// started over.
    pub async fn start(&self) -> CommandResult {
        let mut pipeline = self.pipeline.lock().await;

        if let Some(pacer) = pipeline.pacer.take() {
            if pacer.has_source().await {
                info!("Already streaming, ignoring start");
                pipeline.pacer = Some(pacer);
                return Ok(());
            }

            warn!("Live source has run out, restarting");
            pacer.stop().await;
            pipeline.set_state(PipelineState::Idle);
        }

        let path = &self.config.stream.base_source;
        info!("Starting with {}", path.display());

        let file = File::open(path)
            .await
            .map_err(|source| CommandError::SourceOpen {
                path: path.clone(),
                source,
            })?;
        let bitrate = self.probe.probe(path).await;

        let pacer = Pacer::spawn(bitrate, self.broadcaster.clone());
        pacer.attach(Box::new(file)).await;

        pipeline.bitrate = bitrate;
        pipeline.pacer = Some(pacer);
        pipeline.set_state(PipelineState::Playing);

        info!("Streaming at {bitrate} bps");
        Ok(())
    }

    /// Any state -> Idle. Listeners stay registered.
    pub async fn stop(&self) -> CommandResult {
        let mut pipeline = self.pipeline.lock().await;

        match pipeline.pacer.take() {
            Some(pacer) => {
                pacer.stop().await;
                info!("Streaming stopped");
            }
            None => info!("Not streaming, ignoring stop"),
        }

        pipeline.set_state(PipelineState::Idle);
        Ok(())
    }

    /// Playing | PlayingMerged -> Splicing -> PlayingMerged.
    ///
    /// A fresh pacer is connected first, then the live source is taken off
    /// the old pacer and merged with `effect`; the merged output feeds the
    /// fresh pacer. Mixer failures leave the pipeline silent, not broken.
    pub async fn splice_effect(&self, effect: &Path) -> CommandResult {
        let mut pipeline = self.pipeline.lock().await;

        if pipeline.pacer.is_none() {
            return Err(CommandError::NotPlaying);
        }

        let effect_is_file = tokio::fs::metadata(effect)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);
        if !effect_is_file {
            return Err(CommandError::EffectNotFound(effect.display().to_string()));
        }

        let Some(old_pacer) = pipeline.pacer.take() else {
            return Err(CommandError::NotPlaying);
        };

        info!("Splicing {} into the stream", effect.display());
        pipeline.set_state(PipelineState::Splicing);

        let pacer = Pacer::spawn(pipeline.bitrate, self.broadcaster.clone());
        let live = old_pacer.detach().await.unwrap_or_else(|| {
            warn!("Live source already exhausted, merging effect with silence");
            empty_source()
        });
        old_pacer.stop().await;

        let volumes = Volumes {
            base: self.config.sox.song_volume,
            effect: self.config.sox.fx_volume,
        };

        match self.mixer.merge(live, effect, volumes).await {
            Ok(merged) => {
                let source = continue_after_merge(merged, self.config.stream.after_merge);
                pacer.attach(source).await;
            }
            Err(e) => error!("Failed to merge {}: {e:#}", effect.display()),
        }

        pipeline.pacer = Some(pacer);
        pipeline.set_state(PipelineState::PlayingMerged);

        Ok(())
    }
}

/// Builds the source the pacer plays after a splice.
fn continue_after_merge(merged: MergedSource, policy: AfterMerge) -> ByteSource {
    match policy {
        AfterMerge::End => merged.output,
        AfterMerge::Resume => {
            let rest = stream::once(merged.remainder)
                .map(|rest| match rest {
                    Some(rest) => {
                        info!("Merged segment ended, resuming live source");
                        ReaderStream::new(rest).left_stream()
                    }
                    None => stream::empty::<std::io::Result<Bytes>>().right_stream(),
                })
                .flatten();

            let chained = ReaderStream::new(merged.output).chain(rest).boxed();
            Box::new(StreamReader::new(chained))
        }
    }
}
