use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use bytes::Bytes;
use log::debug;

use super::output::{OutputFrame, OutputStreamHandle, StreamId};
use crate::config::DEFAULT_MAX_SURFACE_DIMENSION;
use crate::error::{EffectError, EffectResult};
use crate::pipeline::rgba_len;

/// Drawable pixel buffer owned by exactly one pipeline generation
///
/// Pixels are premultiplied RGBA8. Drawing happens in place, or off to the
/// side in a back buffer that `present_buffer` swaps in. `present()`
/// publishes the current contents to every output handle. Dropping the
/// surface invalidates all handles captured from it.
pub struct RenderSurface {
    id: StreamId,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    back: Vec<u8>,
    presented: u64,
    frames_tx: watch::Sender<Option<OutputFrame>>,
    invalidated: CancellationToken,
}

impl RenderSurface {
    fn allocate(width: u32, height: u32) -> EffectResult<Self> {
        let len = rgba_len(width, height).ok_or_else(|| {
            EffectError::resource(format!("surface {width}x{height} is too large"))
        })?;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|e| {
            EffectError::resource(format!("cannot allocate {width}x{height} surface: {e}"))
        })?;
        pixels.resize(len, 0);

        let (frames_tx, _) = watch::channel(None);
        Ok(Self {
            id: StreamId::unique(),
            width,
            height,
            pixels,
            back: Vec::new(),
            presented: 0,
            frames_tx,
            invalidated: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Number of frames presented so far
    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Publish the current pixels as the stream's newest frame
    pub fn present(&mut self) {
        self.presented += 1;
        let frame = OutputFrame {
            width: self.width,
            height: self.height,
            data: Bytes::copy_from_slice(&self.pixels),
            sequence: self.presented,
        };
        self.frames_tx.send_replace(Some(frame));
    }

    /// Buffer to composite the next frame into, sized for this surface.
    /// Reuses the previously displaced front buffer when there is one.
    pub fn take_back_buffer(&mut self) -> Vec<u8> {
        let back = std::mem::take(&mut self.back);
        if back.len() == self.pixels.len() {
            back
        } else {
            vec![0; self.pixels.len()]
        }
    }

    /// Return an unused back buffer, e.g. after a failed draw
    pub fn recycle_buffer(&mut self, buffer: Vec<u8>) {
        if buffer.len() == self.pixels.len() {
            self.back = buffer;
        }
    }

    /// Swap `buffer` in as the front pixels and present it
    pub fn present_buffer(&mut self, buffer: Vec<u8>) -> EffectResult<()> {
        if buffer.len() != self.pixels.len() {
            return Err(EffectError::frame_render(format!(
                "buffer of {} bytes does not fit {}x{} surface",
                buffer.len(),
                self.width,
                self.height
            )));
        }
        self.back = std::mem::replace(&mut self.pixels, buffer);
        self.present();
        Ok(())
    }

    /// Live handle over this surface's presented frames
    pub fn capture_stream(&self) -> OutputStreamHandle {
        OutputStreamHandle::new(
            self.id,
            self.dimensions(),
            self.frames_tx.subscribe(),
            self.invalidated.clone(),
        )
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        debug!("Releasing surface {} ({}x{})", self.id, self.width, self.height);
        self.invalidated.cancel();
    }
}

impl std::fmt::Debug for RenderSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSurface")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("presented", &self.presented)
            .finish()
    }
}

/// Allocates render surfaces for new pipeline generations
pub trait SurfaceProvider: Send + Sync {
    fn create_surface(&self, width: u32, height: u32) -> EffectResult<RenderSurface>;
}

/// In-memory surfaces bounded by a maximum edge length
#[derive(Debug, Clone)]
pub struct MemorySurfaceProvider {
    max_dimension: u32,
}

impl MemorySurfaceProvider {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }
}

impl Default for MemorySurfaceProvider {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SURFACE_DIMENSION)
    }
}

impl SurfaceProvider for MemorySurfaceProvider {
    fn create_surface(&self, width: u32, height: u32) -> EffectResult<RenderSurface> {
        if width == 0 || height == 0 {
            return Err(EffectError::resource(format!(
                "cannot create empty {width}x{height} surface"
            )));
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(EffectError::resource(format!(
                "surface {width}x{height} exceeds the {} pixel limit",
                self.max_dimension
            )));
        }
        RenderSurface::allocate(width, height)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;

    use super::*;

    #[test]
    fn test_oversized_surface_is_resource_error() {
        let provider = MemorySurfaceProvider::new(64);
        assert!(matches!(
            provider.create_surface(65, 10),
            Err(EffectError::Resource(_))
        ));
        assert!(matches!(
            provider.create_surface(0, 10),
            Err(EffectError::Resource(_))
        ));
        let surface = provider.create_surface(64, 64).unwrap();
        assert_eq!(surface.pixels().len(), 64 * 64 * 4);
    }

    #[test]
    fn test_handles_share_identity() {
        let surface = MemorySurfaceProvider::default().create_surface(4, 4).unwrap();
        let a = surface.capture_stream();
        let b = surface.capture_stream();
        assert_eq!(a, b);
        assert_eq!(a.id(), surface.id());

        let other = MemorySurfaceProvider::default().create_surface(4, 4).unwrap();
        assert_ne!(a, other.capture_stream());
    }

    #[tokio::test]
    async fn test_present_reaches_handle() {
        let mut surface = MemorySurfaceProvider::default().create_surface(2, 1).unwrap();
        let mut handle = surface.capture_stream();
        assert!(handle.latest().is_none());

        surface.pixels_mut().fill(255);
        surface.present();

        let frame = tokio::time::timeout(Duration::from_secs(1), handle.next_frame())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.data.len(), 8);
        assert_eq!(handle.latest().unwrap().sequence, 1);
    }

    #[tokio::test]
    async fn test_drop_invalidates_handles() {
        let mut surface = MemorySurfaceProvider::default().create_surface(2, 2).unwrap();
        let mut handle = surface.capture_stream();
        let stream = handle.frames();
        surface.present();
        assert!(handle.is_live());

        drop(surface);
        assert!(!handle.is_live());
        assert!(handle.latest().is_none());
        assert!(handle.next_frame().await.is_none());

        let collected: Vec<_> = tokio::time::timeout(Duration::from_secs(1), stream.collect())
            .await
            .unwrap();
        assert!(collected.is_empty());
    }

    #[test]
    fn test_back_buffer_swaps_in_on_present() {
        let mut surface = MemorySurfaceProvider::default().create_surface(2, 1).unwrap();
        let handle = surface.capture_stream();

        let mut back = surface.take_back_buffer();
        assert_eq!(back.len(), 8);
        back.fill(9);
        surface.present_buffer(back).unwrap();
        assert!(surface.pixels().iter().all(|&b| b == 9));
        assert_eq!(handle.latest().unwrap().data.as_ref(), &[9; 8]);

        // The displaced front buffer comes back as the next back buffer
        let back = surface.take_back_buffer();
        assert!(back.iter().all(|&b| b == 0));

        assert!(matches!(
            surface.present_buffer(vec![0; 3]),
            Err(EffectError::FrameRender(_))
        ));
        assert_eq!(surface.presented(), 1);
    }
}
