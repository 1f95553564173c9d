//! Set of connected listeners.
//!
//! Each listener owns the receiving half of a bounded channel; the registry
//! keeps the sending half (the sink) keyed by a random id. The lock is only
//! held for non-blocking work, so connects and disconnects can interleave
//! freely with a broadcast pass.

use crate::constants::SUBSCRIBER_BUFFER_CHUNKS;
use bytes::Bytes;
use futures::Stream;
use std::{
    collections::HashMap,
    fmt,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use uuid::Uuid;

pub type Sink = mpsc::Sender<Bytes>;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    subscribers: Arc<Mutex<HashMap<SubscriberId, Sink>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Sink>> {
        // Nothing in here can be left half-updated by a panic
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, sink: Sink) -> SubscriberId {
        let id = SubscriberId::generate();
        self.lock().insert(id, sink);
        id
    }

    /// Removing an id that is not registered is a no-op.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn for_each(&self, mut f: impl FnMut(&SubscriberId, &Sink)) {
        for (id, sink) in self.lock().iter() {
            f(id, sink);
        }
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registers a new listener with the default buffer depth.
    pub fn subscribe(&self) -> Listener {
        self.subscribe_with_capacity(SUBSCRIBER_BUFFER_CHUNKS)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Listener {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.add(tx);

        Listener {
            id,
            rx,
            registry: self.clone(),
        }
    }
}

/// Receiving end of one listener's sink.
///
/// Yields every chunk broadcast while it is registered. Dropping it
/// unregisters the listener.
pub struct Listener {
    id: SubscriberId,
    rx: mpsc::Receiver<Bytes>,
    registry: SubscriberRegistry,
}

impl Listener {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Listener {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if self.registry.remove(&self.id) {
            info!("Closing connection of {}", self.id);
        }
    }
}
