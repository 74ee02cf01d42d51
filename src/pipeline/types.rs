//! Core types for the effect pipeline

use bytes::Bytes;
use image::RgbaImage;

use crate::error::{EffectError, EffectResult};

/// Byte length of a tightly packed RGBA8 buffer, `None` on overflow
pub fn rgba_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
}

/// Token identifying one build of the pipeline
///
/// Every rebuild and every `disable()` moves the controller to a fresh
/// generation; results tagged with an older one are discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// One snapshot of the input stream
///
/// Straight-alpha RGBA8, row-major, tightly packed.
#[derive(Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
    /// Monotonic counter assigned by the producing source
    pub sequence: u64,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> EffectResult<Self> {
        let frame = VideoFrame {
            width,
            height,
            data: data.into(),
            sequence: 0,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// A frame filled with a single straight-alpha color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        VideoFrame {
            width,
            height,
            data: Bytes::from(rgba.repeat(pixels)),
            sequence: 0,
        }
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        VideoFrame {
            width,
            height,
            data: Bytes::from(image.into_raw()),
            sequence: 0,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Check dimensions and buffer length agree
    pub fn validate(&self) -> EffectResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EffectError::frame_render(format!(
                "frame has empty dimensions {}x{}",
                self.width, self.height
            )));
        }
        let expected = rgba_len(self.width, self.height)
            .ok_or_else(|| EffectError::frame_render("frame buffer size overflow"))?;
        if self.data.len() != expected {
            return Err(EffectError::frame_render(format!(
                "frame {}x{} expects {} bytes, got {}",
                self.width,
                self.height,
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Get the size of the frame data in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("size", &self.size())
            .finish()
    }
}

/// Per-pixel foreground confidence (0 = background, 255 = subject)
#[derive(Clone)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl SegmentationMask {
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> EffectResult<Self> {
        let mask = SegmentationMask {
            width,
            height,
            data: data.into(),
        };
        mask.validate()?;
        Ok(mask)
    }

    pub fn filled(width: u32, height: u32, confidence: u8) -> Self {
        SegmentationMask {
            width,
            height,
            data: Bytes::from(vec![confidence; (width as usize) * (height as usize)]),
        }
    }

    /// Build a mask from model output in `[0.0, 1.0]`
    pub fn from_confidence(width: u32, height: u32, values: &[f32]) -> EffectResult<Self> {
        let data: Vec<u8> = values
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        Self::new(width, height, data)
    }

    pub fn validate(&self) -> EffectResult<()> {
        let expected = (self.width as usize).checked_mul(self.height as usize);
        if self.width == 0 || self.height == 0 || expected != Some(self.data.len()) {
            return Err(EffectError::frame_render(format!(
                "mask {}x{} does not match its {} byte buffer",
                self.width,
                self.height,
                self.data.len()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SegmentationMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationMask")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// What the segmentation adapter delivers for one `send`
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    pub mask: SegmentationMask,
    pub frame: VideoFrame,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_monotonic() {
        let g = Generation::default();
        assert!(g.next() > g);
        assert_eq!(g.next().next(), Generation(2));
        assert_eq!(Generation(7).to_string(), "gen#7");
    }

    #[test]
    fn frame_rejects_mismatched_buffer() {
        assert!(VideoFrame::new(2, 2, vec![0u8; 16]).is_ok());
        let err = VideoFrame::new(2, 2, vec![0u8; 15]).unwrap_err();
        assert!(matches!(err, EffectError::FrameRender(_)));
        assert!(VideoFrame::new(0, 2, Vec::<u8>::new()).is_err());
    }

    #[test]
    fn solid_frame_is_well_formed() {
        let frame = VideoFrame::solid(3, 2, [1, 2, 3, 255]);
        frame.validate().unwrap();
        assert_eq!(&frame.data[4..8], &[1, 2, 3, 255]);
    }

    #[test]
    fn mask_from_confidence_clamps() {
        let mask = SegmentationMask::from_confidence(3, 1, &[-1.0, 0.5, 2.0]).unwrap();
        assert_eq!(mask.data.as_ref(), &[0, 128, 255]);
        assert!(SegmentationMask::from_confidence(2, 2, &[0.0]).is_err());
    }
}
