use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use log::{debug, info, trace, warn};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::SegmentationBackend;
use crate::error::{EffectError, EffectResult};
use crate::pipeline::{Generation, SegmentationResult, VideoFrame};

/// One inference outcome, tagged with the generation that requested it
#[derive(Debug)]
pub struct TaggedResult {
    pub generation: Generation,
    pub outcome: EffectResult<SegmentationResult>,
}

/// Lifecycle wrapper around one backend instance
///
/// Results are delivered on the channel given at construction, exactly one
/// per accepted `send`. The adapter does not limit concurrent sends; the
/// controller keeps at most one outstanding.
pub struct SegmentationAdapter {
    backend: Arc<dyn SegmentationBackend>,
    generation: Generation,
    results: mpsc::UnboundedSender<TaggedResult>,
    tasks: JoinSet<()>,
    initialized: bool,
    closed: bool,
}

impl SegmentationAdapter {
    pub fn new(
        backend: Arc<dyn SegmentationBackend>,
        generation: Generation,
        results: mpsc::UnboundedSender<TaggedResult>,
    ) -> Self {
        Self {
            backend,
            generation,
            results,
            tasks: JoinSet::new(),
            initialized: false,
            closed: false,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized && !self.closed
    }

    /// Requests submitted but not yet finished
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub async fn initialize(&mut self) -> EffectResult<()> {
        if self.closed {
            return Err(EffectError::engine_init("adapter already closed"));
        }
        if self.initialized {
            return Ok(());
        }
        self.backend.initialize().await.map_err(|e| match e {
            EffectError::EngineInit(_) => e,
            other => EffectError::engine_init(format!("{}: {other}", self.backend.name())),
        })?;
        self.initialized = true;
        info!(
            "Segmentation backend '{}' ready for {}",
            self.backend.name(),
            self.generation
        );
        Ok(())
    }

    /// Submit one frame; its result arrives later on the result channel
    pub fn send(&mut self, frame: VideoFrame) -> EffectResult<()> {
        if !self.is_initialized() {
            return Err(EffectError::frame_render(
                "segmentation adapter is not initialized",
            ));
        }
        while self.tasks.try_join_next().is_some() {}

        let backend = self.backend.clone();
        let results = self.results.clone();
        let generation = self.generation;
        self.tasks.spawn(async move {
            // A panicking backend still owes the controller a result
            let segmented = AssertUnwindSafe(backend.segment(&frame))
                .catch_unwind()
                .await;
            let outcome = match segmented {
                Ok(segmented) => segmented.map(|mask| SegmentationResult { mask, frame }),
                Err(panic) => {
                    let reason = panic_message(&*panic);
                    warn!("Backend '{}' panicked during inference: {reason}", backend.name());
                    Err(EffectError::frame_render(format!(
                        "segmentation backend panicked: {reason}"
                    )))
                }
            };
            if results.send(TaggedResult { generation, outcome }).is_err() {
                trace!("Result for {generation} has no receiver");
            }
        });
        Ok(())
    }

    /// Wait for outstanding requests, then release the backend.
    /// Safe to call repeatedly; only the first call does anything.
    pub async fn close(&mut self) -> EffectResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let pending = self.tasks.len();
        if pending > 0 {
            debug!("Waiting for {pending} inference request(s) of {}", self.generation);
        }
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Inference task of {} ended abnormally: {e}", self.generation);
            }
        }

        self.backend.close().await.map_err(|e| match e {
            EffectError::Teardown(_) => e,
            other => EffectError::teardown(format!("{}: {other}", self.backend.name())),
        })?;
        debug!("Segmentation backend '{}' closed", self.backend.name());
        Ok(())
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}
