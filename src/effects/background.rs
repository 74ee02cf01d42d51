use std::path::Path;
use std::sync::{Arc, Mutex};

use image::{RgbaImage, imageops};

use crate::compositor::blend::premultiply_in_place;
use crate::error::{EffectError, EffectResult};

/// Decoded raster used by the replace effect, premultiplied RGBA8
///
/// Cloning is cheap; clones share pixels and the scaled-copy cache.
#[derive(Clone)]
pub struct BackgroundImage {
    inner: Arc<Inner>,
}

struct Inner {
    width: u32,
    height: u32,
    rgba8_premul: Vec<u8>,
    scaled: Mutex<Option<Scaled>>,
}

struct Scaled {
    width: u32,
    height: u32,
    pixels: Arc<Vec<u8>>,
}

impl BackgroundImage {
    pub fn decode(bytes: &[u8]) -> EffectResult<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| EffectError::config(format!("cannot decode background image: {e}")))?;
        Self::from_rgba_image(image.to_rgba8())
    }

    pub fn open(path: impl AsRef<Path>) -> EffectResult<Self> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| {
            EffectError::config(format!("cannot open background {}: {e}", path.display()))
        })?;
        Self::from_rgba_image(image.to_rgba8())
    }

    /// Takes straight-alpha pixels
    pub fn from_rgba_image(image: RgbaImage) -> EffectResult<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(EffectError::config("background image is empty"));
        }
        let mut rgba8_premul = image.into_raw();
        premultiply_in_place(&mut rgba8_premul);
        Ok(Self::from_premultiplied(width, height, rgba8_premul))
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> EffectResult<Self> {
        Self::from_rgba_image(RgbaImage::from_pixel(width, height, image::Rgba(rgba)))
    }

    fn from_premultiplied(width: u32, height: u32, rgba8_premul: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Inner {
                width,
                height,
                rgba8_premul,
                scaled: Mutex::new(None),
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.inner.rgba8_premul
    }

    /// Premultiplied pixels stretched to `width x height`.
    /// The last scaled copy is cached, so a steady surface size resizes once.
    pub fn scaled_to(&self, width: u32, height: u32) -> EffectResult<Arc<Vec<u8>>> {
        if (width, height) == (self.inner.width, self.inner.height) {
            return Ok(Arc::new(self.inner.rgba8_premul.clone()));
        }

        let mut cache = self
            .inner
            .scaled
            .lock()
            .map_err(|_| EffectError::frame_render("background cache poisoned"))?;
        if let Some(scaled) = cache.as_ref()
            && scaled.width == width
            && scaled.height == height
        {
            return Ok(scaled.pixels.clone());
        }

        let source = RgbaImage::from_raw(
            self.inner.width,
            self.inner.height,
            self.inner.rgba8_premul.clone(),
        )
        .ok_or_else(|| EffectError::frame_render("background buffer does not match its size"))?;
        let resized = imageops::resize(&source, width, height, imageops::FilterType::Triangle);
        let pixels = Arc::new(resized.into_raw());
        *cache = Some(Scaled {
            width,
            height,
            pixels: pixels.clone(),
        });
        Ok(pixels)
    }

    /// Identity of the shared pixel data
    pub fn ptr_eq(&self, other: &BackgroundImage) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
