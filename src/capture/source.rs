//! Ready-made input sources

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use super::traits::{SourceId, VideoSource};
use crate::pipeline::VideoFrame;

/// Repeats one still frame forever
pub struct StaticSource {
    id: SourceId,
    frame: VideoFrame,
    sequence: AtomicU64,
}

impl StaticSource {
    pub fn new(frame: VideoFrame) -> Self {
        Self {
            id: SourceId::unique(),
            frame,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_id(id: SourceId, frame: VideoFrame) -> Self {
        Self {
            id,
            frame,
            sequence: AtomicU64::new(0),
        }
    }
}

impl VideoSource for StaticSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn snapshot(&self) -> Option<VideoFrame> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        Some(self.frame.clone().with_sequence(sequence))
    }
}

/// Push-based source: a producer (camera, decoder) publishes frames and the
/// pipeline always samples the latest one.
pub struct LiveSource {
    id: SourceId,
    latest_tx: watch::Sender<Option<VideoFrame>>,
    latest_rx: watch::Receiver<Option<VideoFrame>>,
    sequence: AtomicU64,
}

impl LiveSource {
    pub fn new() -> Self {
        let (latest_tx, latest_rx) = watch::channel(None);
        Self {
            id: SourceId::unique(),
            latest_tx,
            latest_rx,
            sequence: AtomicU64::new(0),
        }
    }

    /// Replace the current frame; older frames are never delivered
    pub fn push(&self, frame: VideoFrame) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.latest_tx.send_replace(Some(frame.with_sequence(sequence)));
    }

    /// Forget the current frame (e.g. camera turned off)
    pub fn clear(&self) {
        self.latest_tx.send_replace(None);
    }
}

impl Default for LiveSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for LiveSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn snapshot(&self) -> Option<VideoFrame> {
        self.latest_rx.borrow().clone()
    }
}
