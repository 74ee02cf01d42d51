//! Traits for input stream sources

use std::sync::atomic::{AtomicU64, Ordering};

use crate::pipeline::VideoFrame;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an input stream
///
/// Two configurations refer to the same stream exactly when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a process-unique id
    pub fn unique() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        SourceId(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Live video input the controller samples once per tick
pub trait VideoSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Current frame, or `None` while the source has nothing to show yet
    fn snapshot(&self) -> Option<VideoFrame>;
}
