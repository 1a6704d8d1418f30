//! Cross-thread audio queue and the detection loop's stream buffer.
//!
//! The queue is the single rendezvous point between ingestion sources (the
//! control plane and any number of UDP listener threads) and the detection
//! thread. It is an unbounded crossbeam channel: producers never block and
//! never drop, at the cost of memory growth if decoding falls behind.

pub mod chunk;
pub mod stream;

use crossbeam_channel::{Receiver, Sender};

use self::chunk::AudioChunk;
use crate::error::{HotwordError, Result};

/// Work items for the detection thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Audio(AudioChunk),
    /// Gate closed: end any active utterance and forget buffered audio.
    EndUtterance,
    /// Bus closed: stop after everything queued ahead of this marker.
    Shutdown,
}

/// Producer half. Cheap to clone; one clone per ingestion source.
#[derive(Debug, Clone)]
pub struct AudioSender(Sender<QueueItem>);

/// Consumer half, held by the detection thread only.
#[derive(Debug)]
pub struct AudioReceiver(Receiver<QueueItem>);

/// Create a matched sender/receiver pair.
pub fn audio_queue() -> (AudioSender, AudioReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (AudioSender(tx), AudioReceiver(rx))
}

impl AudioSender {
    /// Enqueue a frame without waiting for the consumer.
    ///
    /// # Errors
    /// `HotwordError::QueueDisconnected` once the detection thread has exited.
    pub fn push_audio(&self, chunk: AudioChunk) -> Result<()> {
        self.push(QueueItem::Audio(chunk))
    }

    pub fn push(&self, item: QueueItem) -> Result<()> {
        self.0
            .send(item)
            .map_err(|_| HotwordError::QueueDisconnected)
    }
}

impl AudioReceiver {
    /// Block until an item arrives. `None` once every sender is gone.
    pub fn pop(&self) -> Option<QueueItem> {
        self.0.recv().ok()
    }

    pub fn pop_timeout(&self, timeout: std::time::Duration) -> Option<QueueItem> {
        self.0.recv_timeout(timeout).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
