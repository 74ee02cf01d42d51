//! Effect pipeline
//!
//! One [`EffectController`] drives one pipeline generation at a time:
//! - [`TickScheduler`] paces frame requests at a fixed rate
//! - the segmentation adapter turns each request into a mask
//! - the compositor paints each result onto the generation's render surface
//!
//! Every rebuild or disable moves to a fresh [`Generation`]; results tagged
//! with an older one are discarded. [`PipelineHealth`] counts what happened.

pub mod controller;
pub mod health;
pub mod state;
pub mod ticker;
pub mod types;

pub use controller::EffectController;
pub use health::{HealthSummary, PipelineHealth};
pub use state::PipelineState;
pub use ticker::{Tick, TickCommand, TickScheduler};
pub use types::{Generation, SegmentationMask, SegmentationResult, VideoFrame, rgba_len};
