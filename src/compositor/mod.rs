//! Compositor
//!
//! Paints one segmentation result onto a render surface with ordered
//! alpha-composite passes: clear, mask (replace), foreground (`source-in`),
//! background (`destination-over`). All layers are stretched to the surface.

pub mod blend;
pub mod blur;

use image::{GrayImage, RgbaImage, imageops};
use log::{trace, warn};

use crate::display::RenderSurface;
use crate::effects::{EffectConfig, EffectKind};
use crate::error::{EffectError, EffectResult};
use crate::pipeline::{SegmentationMask, SegmentationResult, VideoFrame, rgba_len};

const RESAMPLE_FILTER: imageops::FilterType = imageops::FilterType::Triangle;

#[derive(Debug, Default, Clone, Copy)]
pub struct Compositor;

impl Compositor {
    pub fn new() -> Self {
        Self
    }

    /// Draw `result` onto `surface` using the effect in `config`.
    ///
    /// Returns `false` when the frame was dropped; the error is logged and the
    /// surface keeps its previous contents.
    pub fn draw(
        &self,
        surface: &mut RenderSurface,
        result: &SegmentationResult,
        config: &EffectConfig,
    ) -> bool {
        match self.try_draw(surface, result, config) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping frame {}: {e}", result.frame.sequence);
                false
            }
        }
    }

    pub fn try_draw(
        &self,
        surface: &mut RenderSurface,
        result: &SegmentationResult,
        config: &EffectConfig,
    ) -> EffectResult<()> {
        let dimensions = surface.dimensions();
        self.render_into(surface.pixels_mut(), dimensions, result, config)
    }

    /// Composite into a bare premultiplied RGBA8 buffer of `width`x`height`.
    ///
    /// Touches no shared state, so it can run on a blocking thread while the
    /// surface itself stays with its owner.
    pub fn render_into(
        &self,
        pixels: &mut [u8],
        (width, height): (u32, u32),
        result: &SegmentationResult,
        config: &EffectConfig,
    ) -> EffectResult<()> {
        result.frame.validate()?;
        result.mask.validate()?;
        if Some(pixels.len()) != rgba_len(width, height) {
            return Err(EffectError::frame_render(format!(
                "target buffer of {} bytes does not match {width}x{height}",
                pixels.len()
            )));
        }

        // Everything fallible happens before the buffer is touched
        let mask = mask_to_surface(&result.mask, width, height)?;
        let foreground = frame_to_surface(&result.frame, width, height)?;
        let background = match &config.effect {
            EffectKind::Blur(level) => {
                blur::blur_rgba8_premul(&foreground, width, height, level.radius_px() as f32)?
            }
            EffectKind::Replace(image) => image.scaled_to(width, height)?.to_vec(),
        };

        blend::clear(pixels);
        blend::draw_mask(pixels, &mask)?;
        blend::source_in_place(pixels, &foreground)?;
        blend::destination_over_in_place(pixels, &background)?;
        if config.mirror {
            blend::mirror_in_place(pixels, width);
        }

        trace!(
            "Composited frame {} ({}) at {width}x{height}",
            result.frame.sequence,
            config.effect.name()
        );
        Ok(())
    }
}

fn mask_to_surface(mask: &SegmentationMask, width: u32, height: u32) -> EffectResult<Vec<u8>> {
    if (mask.width, mask.height) == (width, height) {
        return Ok(mask.data.to_vec());
    }
    let image = GrayImage::from_raw(mask.width, mask.height, mask.data.to_vec())
        .ok_or_else(|| EffectError::frame_render("mask buffer does not match its size"))?;
    Ok(imageops::resize(&image, width, height, RESAMPLE_FILTER).into_raw())
}

/// Premultiplied copy of `frame` stretched to the surface
fn frame_to_surface(frame: &VideoFrame, width: u32, height: u32) -> EffectResult<Vec<u8>> {
    let mut pixels = frame.data.to_vec();
    blend::premultiply_in_place(&mut pixels);
    if (frame.width, frame.height) == (width, height) {
        return Ok(pixels);
    }
    let image = RgbaImage::from_raw(frame.width, frame.height, pixels)
        .ok_or_else(|| EffectError::frame_render("frame buffer does not match its size"))?;
    Ok(imageops::resize(&image, width, height, RESAMPLE_FILTER).into_raw())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::capture::StaticSource;
    use crate::display::{MemorySurfaceProvider, SurfaceProvider};
    use crate::effects::{BackgroundImage, BlurLevel};

    const W: u32 = 16;
    const H: u32 = 8;

    fn surface() -> RenderSurface {
        MemorySurfaceProvider::default().create_surface(W, H).unwrap()
    }

    fn config(effect: EffectKind) -> EffectConfig {
        let source = Arc::new(StaticSource::new(VideoFrame::solid(W, H, [0, 0, 0, 255])));
        EffectConfig::new(source, W, H, effect)
    }

    /// Left half subject, right half background
    fn half_mask() -> SegmentationMask {
        let mut data = vec![0u8; (W * H) as usize];
        for row in data.chunks_exact_mut(W as usize) {
            row[..(W / 2) as usize].fill(255);
        }
        SegmentationMask::new(W, H, data).unwrap()
    }

    fn px(pixels: &[u8], x: u32, y: u32) -> [u8; 4] {
        let i = ((y * W + x) * 4) as usize;
        [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
    }

    #[test]
    fn replace_fills_outside_mask_only() {
        let mut surface = surface();
        let result = SegmentationResult {
            mask: half_mask(),
            frame: VideoFrame::solid(W, H, [200, 0, 0, 255]),
        };
        let bg = BackgroundImage::solid(2, 2, [0, 0, 255, 255]).unwrap();
        assert!(Compositor.draw(&mut surface, &result, &config(EffectKind::Replace(bg))));

        assert_eq!(px(surface.pixels(), 1, 1), [200, 0, 0, 255]);
        assert_eq!(px(surface.pixels(), W - 2, 1), [0, 0, 255, 255]);
    }

    #[test]
    fn mirror_flips_output() {
        let mut surface = surface();
        let result = SegmentationResult {
            mask: half_mask(),
            frame: VideoFrame::solid(W, H, [200, 0, 0, 255]),
        };
        let bg = BackgroundImage::solid(1, 1, [0, 0, 255, 255]).unwrap();
        let config = config(EffectKind::Replace(bg)).with_mirror(true);
        assert!(Compositor.draw(&mut surface, &result, &config));

        assert_eq!(px(surface.pixels(), 1, 1), [0, 0, 255, 255]);
        assert_eq!(px(surface.pixels(), W - 2, 1), [200, 0, 0, 255]);
    }

    #[test]
    fn blur_background_is_opaque_and_subject_is_sharp() {
        let mut surface = surface();
        let mut data = Vec::with_capacity((W * H * 4) as usize);
        for y in 0..H {
            for x in 0..W {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let frame = VideoFrame::new(W, H, data).unwrap();
        let result = SegmentationResult {
            mask: half_mask(),
            frame,
        };
        assert!(Compositor.draw(
            &mut surface,
            &result,
            &config(EffectKind::Blur(BlurLevel::Low))
        ));

        let pixels = surface.pixels();
        assert!(pixels.chunks_exact(4).all(|p| p[3] == 255));
        // Subject keeps the checkerboard, background is smoothed toward grey
        assert_eq!(px(pixels, 0, 0), [255, 255, 255, 255]);
        assert_eq!(px(pixels, 1, 0), [0, 0, 0, 255]);
        let blurred = px(pixels, W - 3, 3)[0];
        assert!(blurred > 40 && blurred < 215);
    }

    #[test]
    fn mask_and_frame_are_stretched_to_surface() {
        let mut surface = surface();
        let result = SegmentationResult {
            mask: SegmentationMask::filled(2, 2, 255),
            frame: VideoFrame::solid(4, 2, [10, 20, 30, 255]),
        };
        assert!(Compositor.draw(
            &mut surface,
            &result,
            &config(EffectKind::Blur(BlurLevel::High))
        ));
        assert!(
            surface
                .pixels()
                .chunks_exact(4)
                .all(|p| p == [10, 20, 30, 255])
        );
    }

    #[test]
    fn malformed_frame_is_dropped_without_touching_surface() {
        let mut surface = surface();
        let good = SegmentationResult {
            mask: SegmentationMask::filled(W, H, 255),
            frame: VideoFrame::solid(W, H, [1, 2, 3, 255]),
        };
        let config = config(EffectKind::Blur(BlurLevel::Medium));
        assert!(Compositor.draw(&mut surface, &good, &config));
        let before = surface.pixels().to_vec();

        let bad = SegmentationResult {
            mask: SegmentationMask::filled(W, H, 255),
            frame: VideoFrame {
                width: W,
                height: H,
                data: Bytes::from_static(&[0, 0, 0]),
                sequence: 9,
            },
        };
        assert!(!Compositor.draw(&mut surface, &bad, &config));
        assert!(matches!(
            Compositor.try_draw(&mut surface, &bad, &config),
            Err(EffectError::FrameRender(_))
        ));
        assert_eq!(surface.pixels(), before.as_slice());
    }

    #[test]
    fn render_into_matches_surface_draw() {
        let result = SegmentationResult {
            mask: half_mask(),
            frame: VideoFrame::solid(W, H, [90, 140, 30, 255]),
        };
        let config = config(EffectKind::Blur(BlurLevel::Medium));
        let mut surface = surface();
        assert!(Compositor.draw(&mut surface, &result, &config));

        let mut buffer = vec![7u8; (W * H * 4) as usize];
        Compositor
            .render_into(&mut buffer, (W, H), &result, &config)
            .unwrap();
        assert_eq!(buffer.as_slice(), surface.pixels());

        let mut short = vec![0u8; 16];
        assert!(matches!(
            Compositor.render_into(&mut short, (W, H), &result, &config),
            Err(EffectError::FrameRender(_))
        ));
        assert!(short.iter().all(|&b| b == 0));
    }
}
