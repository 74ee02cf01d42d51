//! Input stream sources
//!
//! The camera or decoder that produces frames lives outside this crate; the
//! pipeline only needs a stable identity and a way to sample the current frame.

mod source;
mod traits;

pub use source::{LiveSource, StaticSource};
pub use traits::{SourceId, VideoSource};
