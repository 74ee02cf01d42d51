use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::debug;

use super::SegmentationBackend;
use crate::error::{EffectError, EffectResult};
use crate::pipeline::{SegmentationMask, VideoFrame};

const DEFAULT_KEY: [u8; 3] = [0, 177, 64];
const DEFAULT_TOLERANCE: u8 = 80;

/// Deterministic backend that treats pixels near a key color as background
///
/// Colour distance is euclidean in RGB. Pixels within `tolerance` of the key
/// get confidence 0, pixels beyond `tolerance + softness` get 255, and the
/// band between ramps linearly.
#[derive(Debug)]
pub struct ChromaKeyBackend {
    key: [u8; 3],
    tolerance: f32,
    softness: f32,
    ready: AtomicBool,
}

impl ChromaKeyBackend {
    pub fn new(key: [u8; 3], tolerance: u8) -> Self {
        Self {
            key,
            tolerance: f32::from(tolerance),
            softness: (f32::from(tolerance) / 2.0).max(1.0),
            ready: AtomicBool::new(false),
        }
    }

    pub fn with_softness(mut self, softness: u8) -> Self {
        self.softness = f32::from(softness).max(1.0);
        self
    }

    /// Parse `rrggbb` (an optional leading `#` is accepted)
    pub fn parse_key(hex: &str) -> EffectResult<[u8; 3]> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(EffectError::config(format!("invalid key color {hex:?}")));
        }
        let mut key = [0u8; 3];
        for (i, channel) in key.iter_mut().enumerate() {
            *channel = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| EffectError::config(format!("invalid key color {hex:?}")))?;
        }
        Ok(key)
    }

    pub fn key(&self) -> [u8; 3] {
        self.key
    }

    fn confidence(key: [u8; 3], tolerance: f32, softness: f32, px: &[u8]) -> u8 {
        let d2: f32 = (0..3)
            .map(|c| {
                let d = f32::from(px[c]) - f32::from(key[c]);
                d * d
            })
            .sum();
        let d = d2.sqrt();
        if d <= tolerance {
            0
        } else if d >= tolerance + softness {
            255
        } else {
            (((d - tolerance) / softness) * 255.0).round() as u8
        }
    }
}

impl Default for ChromaKeyBackend {
    fn default() -> Self {
        Self::new(DEFAULT_KEY, DEFAULT_TOLERANCE)
    }
}

#[async_trait]
impl SegmentationBackend for ChromaKeyBackend {
    async fn initialize(&self) -> EffectResult<()> {
        self.ready.store(true, Ordering::Release);
        debug!(
            "Chroma key #{:02x}{:02x}{:02x} (tolerance {})",
            self.key[0], self.key[1], self.key[2], self.tolerance
        );
        Ok(())
    }

    async fn segment(&self, frame: &VideoFrame) -> EffectResult<SegmentationMask> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(EffectError::frame_render("chroma key backend is not initialized"));
        }
        frame.validate()?;

        let (key, tolerance, softness) = (self.key, self.tolerance, self.softness);
        let (width, height) = (frame.width, frame.height);
        let data = frame.data.clone();
        let mask = tokio::task::spawn_blocking(move || {
            data.chunks_exact(4)
                .map(|px| Self::confidence(key, tolerance, softness, px))
                .collect::<Vec<u8>>()
        })
        .await
        .map_err(|e| EffectError::frame_render(format!("chroma key task failed: {e}")))?;

        SegmentationMask::new(width, height, mask)
    }

    async fn close(&self) -> EffectResult<()> {
        self.ready.store(false, Ordering::Release);
        Ok(())
    }

    fn name(&self) -> &str {
        "chroma-key"
    }
}
