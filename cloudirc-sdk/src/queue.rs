//! Bounded event queue between the transport and the single event pump.
//!
//! Producers decode and enqueue; a full queue suspends the producer instead
//! of dropping or growing. Exactly one [`EventReceiver`] exists, so events
//! are processed one at a time in enqueue order.

use tokio::sync::mpsc;

use crate::envelope::decode;
use crate::event::Event;

/// Producer handle handed to the transport. Cheap to clone.
#[derive(Clone, Debug)]
pub struct EventSubmitter {
    tx: mpsc::Sender<Event>,
}

/// Consumer end of the queue.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
}

/// Create a queue holding at most `capacity` events (minimum 1).
pub fn event_queue(capacity: usize) -> (EventSubmitter, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSubmitter { tx }, EventReceiver { rx })
}

impl EventSubmitter {
    /// Decode a raw message and enqueue it, waiting while the queue is full.
    ///
    /// Fire-and-forget: malformed messages are dropped and a closed queue
    /// discards the event; neither is reported to the caller.
    pub async fn submit(&self, raw: &[u8]) {
        let Some(event) = decode_or_drop(raw) else {
            return;
        };
        if self.tx.send(event).await.is_err() {
            tracing::debug!("event queue closed, dropping event");
        }
    }

    /// Blocking variant of [`submit`](Self::submit) for transports running
    /// on plain threads. Must not be called from inside an async context.
    pub fn blocking_submit(&self, raw: &[u8]) {
        let Some(event) = decode_or_drop(raw) else {
            return;
        };
        if self.tx.blocking_send(event).is_err() {
            tracing::debug!("event queue closed, dropping event");
        }
    }

    /// Configured queue capacity.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    /// Whether the consumer is gone; further submissions are discarded.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl EventReceiver {
    /// Next event in enqueue order; `None` once every submitter is dropped
    /// and the queue is drained.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

fn decode_or_drop(raw: &[u8]) -> Option<Event> {
    match decode(raw) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(error = %e, bytes = raw.len(), "dropping undecodable message");
            None
        }
    }
}
