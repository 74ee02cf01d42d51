//! Output stream handles
//!
//! A handle is a cheap, cloneable view over one render surface's presented
//! frames. It stays valid while the surface's generation is current; once the
//! surface is released the handle reports `is_live() == false` and its
//! frame stream ends.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures_util::Stream;
use image::RgbaImage;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::compositor::blend::unpremultiply_in_place;
use crate::error::{EffectError, EffectResult};
use crate::pipeline::rgba_len;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl StreamId {
    pub(crate) fn unique() -> Self {
        StreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// One composited frame, premultiplied RGBA8
#[derive(Clone)]
pub struct OutputFrame {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
    /// Per-surface presentation counter, starting at 1
    pub sequence: u64,
}

impl OutputFrame {
    /// Straight-alpha copy suitable for encoding
    pub fn to_rgba_image(&self) -> EffectResult<RgbaImage> {
        if rgba_len(self.width, self.height) != Some(self.data.len()) {
            return Err(EffectError::frame_render(
                "output frame buffer does not match its size",
            ));
        }
        let mut pixels = self.data.to_vec();
        unpremultiply_in_place(&mut pixels);
        RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| EffectError::frame_render("output frame buffer does not match its size"))
    }
}

impl std::fmt::Debug for OutputFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[derive(Clone)]
pub struct OutputStreamHandle {
    id: StreamId,
    width: u32,
    height: u32,
    frames: watch::Receiver<Option<OutputFrame>>,
    invalidated: CancellationToken,
}

impl OutputStreamHandle {
    pub(crate) fn new(
        id: StreamId,
        (width, height): (u32, u32),
        frames: watch::Receiver<Option<OutputFrame>>,
        invalidated: CancellationToken,
    ) -> Self {
        Self {
            id,
            width,
            height,
            frames,
            invalidated,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// False once the owning generation has been torn down
    pub fn is_live(&self) -> bool {
        !self.invalidated.is_cancelled()
    }

    /// Most recently presented frame, if any
    pub fn latest(&self) -> Option<OutputFrame> {
        if !self.is_live() {
            return None;
        }
        self.frames.borrow().clone()
    }

    /// Wait for the next presented frame; `None` once the stream is invalidated
    pub async fn next_frame(&mut self) -> Option<OutputFrame> {
        loop {
            tokio::select! {
                biased;
                _ = self.invalidated.cancelled() => return None,
                changed = self.frames.changed() => {
                    changed.ok()?;
                    if let Some(frame) = self.frames.borrow_and_update().clone() {
                        return Some(frame);
                    }
                }
            }
        }
    }

    pub fn frames(&self) -> impl Stream<Item = OutputFrame> + Send + 'static {
        futures_util::stream::unfold(self.clone(), |mut handle| async move {
            let frame = handle.next_frame().await?;
            Some((frame, handle))
        })
    }
}

impl PartialEq for OutputStreamHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OutputStreamHandle {}

impl std::fmt::Debug for OutputStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStreamHandle")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("live", &self.is_live())
            .finish()
    }
}
