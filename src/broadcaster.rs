use crate::registry::{SubscriberId, SubscriberRegistry};
use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;

/// Fan-out sink at the end of the live pipeline.
#[derive(Clone)]
pub struct Broadcaster {
    registry: SubscriberRegistry,
}

impl Broadcaster {
    pub fn new(registry: SubscriberRegistry) -> Self {
        Self { registry }
    }

    /// Hands `chunk` to every registered listener.
    ///
    /// Never blocks: a listener whose buffer is full misses this chunk, a
    /// listener whose receiving end is gone gets unregistered. Neither
    /// affects delivery to anyone else.
    pub fn write(&self, chunk: Bytes) {
        let mut closed: Vec<SubscriberId> = vec![];

        self.registry.for_each(|id, sink| {
            if sink.is_closed() {
                closed.push(*id);
                return;
            }

            match sink.try_send(chunk.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    trace!("Listener {id} lagging behind, dropping {} bytes", chunk.len());
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        });

        for id in closed {
            if self.registry.remove(&id) {
                debug!("Removed closed listener {id}");
            }
        }
    }
}
