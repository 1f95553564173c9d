//! Real-time pacing of a byte source.
//!
//! A [`Pacer`] is a background task that reads from its attached source and
//! writes into the [`Broadcaster`] no faster than the configured bitrate. The
//! source can be swapped out while the task keeps running, which is what
//! lets a splice redirect the live audio without touching the listeners.

use crate::{
    broadcaster::Broadcaster,
    constants::{CHUNKS_PER_SECOND, MAX_CHUNK_SIZE},
};
use bytes::Bytes;
use std::{io::Cursor, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{sleep_until, Instant},
};

/// Any upstream producer of audio bytes.
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

pub fn empty_source() -> ByteSource {
    Box::new(tokio::io::empty())
}

enum PacerCommand {
    Attach(ByteSource),
    Detach(oneshot::Sender<Option<ByteSource>>),
    HasSource(oneshot::Sender<bool>),
    Stop,
}

pub struct Pacer {
    commands: mpsc::Sender<PacerCommand>,
    task: JoinHandle<()>,
}

impl Pacer {
    /// Spawns a pacer writing into `broadcaster` at `bits_per_second`.
    ///
    /// The pacer starts without a source and emits nothing until one is
    /// attached.
    pub fn spawn(bits_per_second: u32, broadcaster: Broadcaster) -> Pacer {
        let (tx, rx) = mpsc::channel(8);
        let task = PacerTask::new(bits_per_second, broadcaster);

        Pacer {
            commands: tx,
            task: tokio::spawn(task.run(rx)),
        }
    }

    /// Replaces the current source. The pacing clock restarts at this point.
    pub async fn attach(&self, source: ByteSource) {
        if self
            .commands
            .send(PacerCommand::Attach(source))
            .await
            .is_err()
        {
            warn!("Tried to attach a source to a finished pacer");
        }
    }

    /// Takes the current source away from the pacer, including any bytes that
    /// were read but not yet released. The pacer keeps running, silent.
    pub async fn detach(&self) -> Option<ByteSource> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(PacerCommand::Detach(tx)).await.ok()?;
        rx.await.ok().flatten()
    }

    /// Whether the pacer still has anything to play: `false` before the first
    /// attach, after a detach and once the source has run out.
    pub async fn has_source(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(PacerCommand::HasSource(tx)).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Ends the pacer. Once this returns no further chunk reaches the
    /// broadcaster.
    pub async fn stop(self) {
        let _ = self.commands.send(PacerCommand::Stop).await;

        if let Err(e) = self.task.await {
            error!("Pacer task failed: {e:?}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

struct PacerTask {
    bytes_per_second: f64,
    chunk_size: usize,
    broadcaster: Broadcaster,
    source: Option<ByteSource>,

    /// Chunk read from the source, waiting for its release time
    pending: Option<Bytes>,

    /// Pacing clock: when the current source was attached and how much of
    /// it has been released since
    attached_at: Instant,
    released: u64,
}

impl PacerTask {
    fn new(bits_per_second: u32, broadcaster: Broadcaster) -> Self {
        let bytes_per_second = (bits_per_second / 8).max(1);

        PacerTask {
            bytes_per_second: bytes_per_second as f64,
            chunk_size: chunk_size(bytes_per_second),
            broadcaster,
            source: None,
            pending: None,
            attached_at: Instant::now(),
            released: 0,
        }
    }

    /// Release time of the next chunk, so that at any instant at most one
    /// chunk more than the bitrate allows has gone out.
    fn next_release(&self) -> Instant {
        self.attached_at + Duration::from_secs_f64(self.released as f64 / self.bytes_per_second)
    }

    fn attach(&mut self, source: ByteSource) {
        if self.source.is_some() || self.pending.is_some() {
            debug!("Replacing attached pacer source");
        }

        self.source = Some(source);
        self.pending = None;
        self.attached_at = Instant::now();
        self.released = 0;
    }

    fn detach(&mut self) -> Option<ByteSource> {
        let source = self.source.take();
        let Some(pending) = self.pending.take() else {
            return source;
        };

        let pending = Cursor::new(pending);
        let source: ByteSource = match source {
            Some(source) => Box::new(pending.chain(source)),
            None => Box::new(pending),
        };

        Some(source)
    }

    fn release(&mut self, chunk: Bytes) {
        trace!("Releasing {} bytes", chunk.len());
        self.released += chunk.len() as u64;
        self.broadcaster.write(chunk);
    }

    async fn run(mut self, mut commands: mpsc::Receiver<PacerCommand>) {
        loop {
            let release_at = self.next_release();
            let waiting = self.pending.is_some();
            let reading = !waiting && self.source.is_some();

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(PacerCommand::Attach(source)) => self.attach(source),
                    Some(PacerCommand::Detach(reply)) => {
                        let _ = reply.send(self.detach());
                    }
                    Some(PacerCommand::HasSource(reply)) => {
                        let _ = reply.send(self.source.is_some() || self.pending.is_some());
                    }
                    Some(PacerCommand::Stop) | None => break,
                },

                _ = sleep_until(release_at), if waiting => {
                    if let Some(chunk) = self.pending.take() {
                        self.release(chunk);
                    }
                }

                read = read_chunk(self.source.as_mut(), self.chunk_size), if reading => match read {
                    Ok(Some(chunk)) => self.pending = Some(chunk),
                    Ok(None) => {
                        info!("Pacer source reached end of data");
                        self.source = None;
                    }
                    Err(e) => {
                        error!("Error while reading pacer source: {e}");
                        self.source = None;
                    }
                },
            }
        }

        debug!("Pacer stopped after releasing {} bytes", self.released);
    }
}

/// Reads at most `chunk_size` bytes. Cancel safe: if dropped before
/// completion no data has been consumed from `source`.
async fn read_chunk(
    source: Option<&mut ByteSource>,
    chunk_size: usize,
) -> std::io::Result<Option<Bytes>> {
    let Some(source) = source else {
        return std::future::pending().await;
    };

    let mut buf = vec![0; chunk_size];
    let read = source.read(&mut buf).await?;

    if read == 0 {
        Ok(None)
    } else {
        buf.truncate(read);
        Ok(Some(Bytes::from(buf)))
    }
}

/// Size of the chunks a pacer releases: a tenth of a second of audio.
pub fn chunk_size(bytes_per_second: u32) -> usize {
    ((bytes_per_second / CHUNKS_PER_SECOND) as usize).clamp(1, MAX_CHUNK_SIZE)
}
