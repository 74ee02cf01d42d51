//! Backdrop: real-time background blur and replacement for live video
//!
//! Feed an [`EffectController`] a [`VideoSource`] and an effect; it runs a
//! segmentation model on a fixed tick and publishes the composited frames as
//! an [`OutputStreamHandle`].

pub mod capture;
pub mod compositor;
pub mod config;
pub mod display;
pub mod effects;
pub mod error;
pub mod pipeline;
pub mod segmentation;
pub mod utils;
pub mod workers;

pub use capture::{LiveSource, SourceId, StaticSource, VideoSource};
pub use config::Settings;
pub use display::{OutputFrame, OutputStreamHandle};
pub use effects::{BackgroundImage, BlurLevel, EffectConfig, EffectKind, EffectUpdate};
pub use error::{EffectError, EffectResult};
pub use pipeline::{EffectController, PipelineState, VideoFrame};
pub use segmentation::{BackendFactory, ChromaKeyBackend, SegmentationBackend};
