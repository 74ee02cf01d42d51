//! Effect controller
//!
//! Owns the accepted configuration and the one running pipeline generation
//! (surface + adapter + scheduler). Every transition, whether a reconfigure, a
//! disable, a tick or a delivered result, runs as one step under the core lock.
//! Compositing is the exception: the pixels are drawn into a back buffer on a
//! blocking thread with the lock released, and only presented if the
//! generation is still current when the lock is taken again.
//!
//! A rebuild bumps the generation, then tears the previous one down
//! completely before the next one is constructed. A failed rebuild leaves the
//! controller `Idle`.

use std::sync::{Arc, Weak};

use log::{debug, info, trace, warn};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::health::PipelineHealth;
use super::state::PipelineState;
use super::ticker::{Tick, TickScheduler};
use super::types::{Generation, SegmentationResult};
use crate::compositor::Compositor;
use crate::config::Settings;
use crate::display::{MemorySurfaceProvider, OutputStreamHandle, RenderSurface, SurfaceProvider};
use crate::effects::{EffectConfig, EffectUpdate};
use crate::error::{EffectError, EffectResult};
use crate::segmentation::{BackendFactory, SegmentationAdapter, TaggedResult};
use crate::utils::store::StreamStore;

pub struct EffectController {
    core: Arc<Mutex<ControllerCore>>,
    factory: Arc<dyn BackendFactory>,
    surfaces: Arc<dyn SurfaceProvider>,
    store: Option<Arc<dyn StreamStore>>,
    health: Arc<PipelineHealth>,
    settings: Settings,
}

/// Mutable controller state, only touched under the lock
struct ControllerCore {
    state: PipelineState,
    generation: Generation,
    config: Option<EffectConfig>,
    bundle: Option<PipelineBundle>,
    compositor: Compositor,
    health: Arc<PipelineHealth>,
}

/// Everything one generation owns; replaced as a whole, never field by field
struct PipelineBundle {
    generation: Generation,
    surface: RenderSurface,
    adapter: SegmentationAdapter,
    scheduler: TickScheduler,
    output: OutputStreamHandle,
    in_flight: bool,
    pump: JoinHandle<()>,
    _pump_guard: DropGuard,
}

enum PumpEvent {
    Tick(Tick),
    Result(TaggedResult),
}

/// One accepted result waiting to be composited off the lock
struct DrawJob {
    generation: Generation,
    dimensions: (u32, u32),
    buffer: Vec<u8>,
    result: SegmentationResult,
    config: EffectConfig,
    compositor: Compositor,
}

/// A composited (or failed) back buffer on its way to the surface
struct FinishedDraw {
    generation: Generation,
    sequence: u64,
    buffer: Option<Vec<u8>>,
    outcome: EffectResult<()>,
}

impl DrawJob {
    async fn run(self) -> FinishedDraw {
        let DrawJob {
            generation,
            dimensions,
            mut buffer,
            result,
            config,
            compositor,
        } = self;
        let sequence = result.frame.sequence;

        let drawn = tokio::task::spawn_blocking(move || {
            let outcome = compositor.render_into(&mut buffer, dimensions, &result, &config);
            (buffer, outcome)
        })
        .await;

        match drawn {
            Ok((buffer, outcome)) => FinishedDraw {
                generation,
                sequence,
                buffer: Some(buffer),
                outcome,
            },
            Err(e) => FinishedDraw {
                generation,
                sequence,
                buffer: None,
                outcome: Err(EffectError::frame_render(format!("compositing task failed: {e}"))),
            },
        }
    }
}

impl EffectController {
    pub fn new(factory: Arc<dyn BackendFactory>, settings: Settings) -> Self {
        let surfaces = Arc::new(MemorySurfaceProvider::new(settings.max_surface_dimension));
        let health = Arc::new(PipelineHealth::new());
        Self {
            core: Arc::new(Mutex::new(ControllerCore {
                state: PipelineState::Idle,
                generation: Generation::default(),
                config: None,
                bundle: None,
                compositor: Compositor::new(),
                health: health.clone(),
            })),
            factory,
            surfaces,
            store: None,
            health,
            settings,
        }
    }

    pub fn with_surface_provider(mut self, surfaces: Arc<dyn SurfaceProvider>) -> Self {
        self.surfaces = surfaces;
        self
    }

    /// Publish the output handle under `settings.stream_key` after every
    /// successful reconfigure; cleared on disable and on failed rebuilds
    pub fn with_stream_store(mut self, store: Arc<dyn StreamStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn health(&self) -> Arc<PipelineHealth> {
        self.health.clone()
    }

    pub async fn state(&self) -> PipelineState {
        self.core.lock().await.state
    }

    pub async fn config(&self) -> Option<EffectConfig> {
        self.core.lock().await.config.clone()
    }

    /// Handle of the running generation, if any
    pub async fn output(&self) -> Option<OutputStreamHandle> {
        let core = self.core.lock().await;
        core.bundle.as_ref().map(|b| b.output.clone())
    }

    pub async fn current_generation(&self) -> Generation {
        self.core.lock().await.generation
    }

    /// Apply `update` over the last accepted configuration.
    ///
    /// Rebuilds the pipeline when there is no prior configuration or the
    /// source or dimensions change; otherwise swaps the stored configuration
    /// and keeps the running pipeline and its handle.
    pub async fn reconfigure(
        &self,
        update: impl Into<EffectUpdate>,
    ) -> EffectResult<OutputStreamHandle> {
        let mut core = self.core.lock().await;
        self.reconfigure_locked(&mut core, update.into()).await
    }

    /// Whether `reconfigure(update)` would rebuild; changes nothing
    pub async fn needs_rebuild(&self, update: impl Into<EffectUpdate>) -> EffectResult<bool> {
        let core = self.core.lock().await;
        let config = update
            .into()
            .resolve(core.config.as_ref(), self.settings.default_size())?;
        Ok(config.requires_rebuild(core.config.as_ref()))
    }

    /// Change only the dimensions of the current configuration
    pub async fn resize(&self, width: u32, height: u32) -> EffectResult<OutputStreamHandle> {
        let mut core = self.core.lock().await;
        if core.config.is_none() {
            return Err(EffectError::config("resize without an active configuration"));
        }
        self.reconfigure_locked(&mut core, EffectUpdate::new().size(width, height))
            .await
    }

    /// Tear down the running pipeline and forget the configuration.
    /// No-op when already idle; never fails.
    pub async fn disable(&self) {
        let mut core = self.core.lock().await;
        if core.bundle.is_none() && core.config.is_none() {
            trace!("disable: already idle");
            return;
        }
        core.generation = core.generation.next();
        core.teardown("disable").await;
        core.config = None;
        self.unpublish();
        info!("Effect disabled ({})", core.generation);
    }

    async fn reconfigure_locked(
        &self,
        core: &mut ControllerCore,
        update: EffectUpdate,
    ) -> EffectResult<OutputStreamHandle> {
        let config = update.resolve(core.config.as_ref(), self.settings.default_size())?;

        if !config.requires_rebuild(core.config.as_ref())
            && let Some(bundle) = core.bundle.as_ref()
        {
            let output = bundle.output.clone();
            debug!(
                "Updating {} in place: {} effect, mirror {}",
                bundle.generation,
                config.effect.name(),
                config.mirror
            );
            core.config = Some(config);
            self.publish(&output);
            return Ok(output);
        }

        core.generation = core.generation.next();
        let generation = core.generation;
        core.teardown("rebuild").await;

        match self.build(&config, generation).await {
            Ok(bundle) => {
                let output = bundle.output.clone();
                info!(
                    "Pipeline {generation} running: {} {}x{} via '{}'",
                    config.effect.name(),
                    config.width,
                    config.height,
                    bundle.adapter.backend_name()
                );
                core.set_state(PipelineState::running(generation));
                core.bundle = Some(bundle);
                core.config = Some(config);
                self.health.record_rebuild();
                self.publish(&output);
                Ok(output)
            }
            Err(e) => {
                warn!("Pipeline {generation} setup failed: {e}");
                core.config = None;
                core.set_state(PipelineState::Idle);
                self.unpublish();
                Err(e)
            }
        }
    }

    /// Construct a full generation. On error everything created so far is
    /// released before returning.
    async fn build(
        &self,
        config: &EffectConfig,
        generation: Generation,
    ) -> EffectResult<PipelineBundle> {
        let surface = self.surfaces.create_surface(config.width, config.height)?;

        let backend = self.factory.create().map_err(|e| match e {
            EffectError::EngineInit(_) => e,
            other => EffectError::engine_init(other.to_string()),
        })?;
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let mut adapter = SegmentationAdapter::new(backend, generation, results_tx);
        if let Err(e) = adapter.initialize().await {
            if let Err(close_err) = adapter.close().await {
                warn!("Closing failed adapter of {generation}: {close_err}");
                self.health.record_teardown_failure();
            }
            return Err(e);
        }
        self.health.record_adapter_init();

        let (scheduler, ticks) = TickScheduler::spawn(self.settings.tick_interval());
        let cancel = CancellationToken::new();
        let pump = tokio::spawn(pump(
            Arc::downgrade(&self.core),
            generation,
            ticks,
            results_rx,
            cancel.clone(),
        ));
        scheduler.start();

        let output = surface.capture_stream();
        Ok(PipelineBundle {
            generation,
            surface,
            adapter,
            scheduler,
            output,
            in_flight: false,
            pump,
            _pump_guard: cancel.drop_guard(),
        })
    }

    fn publish(&self, output: &OutputStreamHandle) {
        if let Some(store) = &self.store {
            store.set(&self.settings.stream_key, output.clone());
        }
    }

    fn unpublish(&self) {
        if let Some(store) = &self.store {
            store.remove(&self.settings.stream_key);
        }
    }
}

impl ControllerCore {
    fn set_state(&mut self, next: PipelineState) {
        if !self.state.can_transition_to(&next) {
            warn!("Unexpected state transition {} -> {}", self.state, next);
        }
        trace!("State {} -> {}", self.state, next);
        self.state = next;
    }

    /// Cancel the pump, stop the scheduler, close the adapter, then release
    /// the surface (which invalidates every handle captured from it)
    async fn teardown(&mut self, reason: &str) {
        let Some(mut bundle) = self.bundle.take() else {
            return;
        };
        let generation = bundle.generation;
        debug!("Tearing down {generation} ({reason})");

        bundle.pump.abort();
        bundle.scheduler.stop();
        bundle.scheduler.shutdown().await;

        if let Err(e) = bundle.adapter.close().await {
            warn!("Teardown of {generation}: {e}");
            self.health.record_teardown_failure();
        }
        drop(bundle);

        self.set_state(PipelineState::Idle);
        info!("{generation} stopped. {}", self.health.summary());
    }

    /// One scheduler tick: request a frame unless one is already in flight
    fn on_tick(&mut self, generation: Generation) {
        let Some(bundle) = self.bundle.as_mut() else {
            return;
        };
        if bundle.generation != generation {
            trace!("Ignoring tick for superseded {generation}");
            return;
        }
        self.health.record_tick();

        if bundle.in_flight {
            self.health.record_tick_dropped();
            trace!("{generation}: inference busy, tick dropped");
            return;
        }
        let Some(config) = self.config.as_ref() else {
            return;
        };
        let Some(frame) = config.source.snapshot() else {
            trace!("{generation}: source {} has no frame yet", config.source_id());
            return;
        };

        match bundle.adapter.send(frame) {
            Ok(()) => {
                bundle.in_flight = true;
                self.health.record_request();
            }
            Err(e) => warn!("{generation}: cannot submit frame: {e}"),
        }
    }

    /// A delivered inference result. If it belongs to the current generation
    /// the request slot is freed and a draw job for it is handed back.
    fn on_result(&mut self, tagged: TaggedResult) -> Option<DrawJob> {
        let generation = tagged.generation;
        let bundle = match self.bundle.as_mut() {
            Some(bundle) if bundle.generation == generation && self.generation == generation => {
                bundle
            }
            _ => {
                self.health.record_stale_result();
                debug!("Discarding result of stale {generation}");
                return None;
            }
        };
        bundle.in_flight = false;

        let result = match tagged.outcome {
            Ok(result) => result,
            Err(e) => {
                self.health.record_inference_failure();
                warn!("{generation}: inference failed: {e}");
                return None;
            }
        };
        let config = self.config.clone()?;
        Some(DrawJob {
            generation,
            dimensions: bundle.surface.dimensions(),
            buffer: bundle.surface.take_back_buffer(),
            result,
            config,
            compositor: self.compositor,
        })
    }

    /// Present a composited buffer unless its generation was superseded
    /// while it was being drawn
    fn finish_draw(&mut self, done: FinishedDraw) {
        let generation = done.generation;
        let bundle = match self.bundle.as_mut() {
            Some(bundle) if bundle.generation == generation && self.generation == generation => {
                bundle
            }
            _ => {
                self.health.record_stale_result();
                debug!("Discarding frame {} drawn for stale {generation}", done.sequence);
                return;
            }
        };

        let presented = match (done.outcome, done.buffer) {
            (Ok(()), Some(buffer)) => bundle.surface.present_buffer(buffer),
            (Err(e), buffer) => {
                if let Some(buffer) = buffer {
                    bundle.surface.recycle_buffer(buffer);
                }
                Err(e)
            }
            (Ok(()), None) => Err(EffectError::frame_render("composited buffer went missing")),
        };
        match presented {
            Ok(()) => self.health.record_frame_rendered(),
            Err(e) => {
                warn!("Dropping frame {}: {e}", done.sequence);
                self.health.record_render_failure();
            }
        }
    }
}

/// Hand one result to the core, composite it with the lock released, then
/// present it. Returns `false` once the controller is gone.
async fn deliver_result(core: &Weak<Mutex<ControllerCore>>, tagged: TaggedResult) -> bool {
    let Some(shared) = core.upgrade() else {
        return false;
    };
    let job = shared.lock().await.on_result(tagged);
    drop(shared);
    let Some(job) = job else {
        return true;
    };

    let done = job.run().await;
    let Some(shared) = core.upgrade() else {
        return false;
    };
    shared.lock().await.finish_draw(done);
    true
}

/// Forward one generation's ticks and results into the core, one locked step each
async fn pump(
    core: Weak<Mutex<ControllerCore>>,
    generation: Generation,
    mut ticks: mpsc::Receiver<Tick>,
    mut results: mpsc::UnboundedReceiver<TaggedResult>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(tagged) = results.recv() => PumpEvent::Result(tagged),
            Some(tick) = ticks.recv() => PumpEvent::Tick(tick),
            else => break,
        };
        match event {
            PumpEvent::Tick(tick) => {
                let Some(shared) = core.upgrade() else {
                    break;
                };
                trace!("{generation}: tick {}", tick.sequence);
                shared.lock().await.on_tick(generation);
            }
            PumpEvent::Result(tagged) => {
                if !deliver_result(&core, tagged).await {
                    break;
                }
            }
        }
    }
    trace!("Pump for {generation} exited");
}
