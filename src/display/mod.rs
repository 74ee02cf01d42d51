//! Render surfaces and the live output streams captured from them

mod output;
mod surface;

pub use output::{OutputFrame, OutputStreamHandle, StreamId};
pub use surface::{MemorySurfaceProvider, RenderSurface, SurfaceProvider};
