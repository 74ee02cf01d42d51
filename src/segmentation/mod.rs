//! Segmentation
//!
//! The model itself is an opaque capability behind [`SegmentationBackend`].
//! [`SegmentationAdapter`] wraps one backend instance for one pipeline
//! generation and turns each `send` into exactly one tagged result.

mod adapter;
mod chroma;

pub use adapter::{SegmentationAdapter, TaggedResult};
pub use chroma::ChromaKeyBackend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EffectResult;
use crate::pipeline::{SegmentationMask, VideoFrame};

/// Trait for segmentation models
#[async_trait]
pub trait SegmentationBackend: Send + Sync {
    /// Load weights / allocate resources. Called once per generation.
    async fn initialize(&self) -> EffectResult<()>;

    /// Compute the foreground mask for one frame
    async fn segment(&self, frame: &VideoFrame) -> EffectResult<SegmentationMask>;

    /// Release resources; must succeed when nothing is in flight
    async fn close(&self) -> EffectResult<()>;

    /// Get the name of this backend for logging
    fn name(&self) -> &str;
}

/// Creates a fresh backend for every pipeline generation
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> EffectResult<Arc<dyn SegmentationBackend>>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> EffectResult<Arc<dyn SegmentationBackend>> + Send + Sync,
{
    fn create(&self) -> EffectResult<Arc<dyn SegmentationBackend>> {
        self()
    }
}
