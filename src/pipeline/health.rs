//! Health monitoring and metrics for the effect pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Health metrics for a controller
///
/// Counters survive rebuilds so they describe the controller's whole life.
/// All fields use atomic operations for thread-safe access.
pub struct PipelineHealth {
    /// Reference point for `last_frame_time`
    base: Instant,

    /// Ticks delivered by the scheduler to the current generation
    pub ticks_received: AtomicU64,

    /// Ticks skipped because an inference was still in flight
    pub ticks_dropped: AtomicU64,

    /// Frames handed to the segmentation adapter
    pub frames_requested: AtomicU64,

    /// Frames composited onto the surface
    pub frames_rendered: AtomicU64,

    /// Composite passes that failed (frame dropped)
    pub render_failures: AtomicU64,

    /// Backend errors reported for a single frame
    pub inference_failures: AtomicU64,

    /// Results discarded because their generation was superseded
    pub stale_results: AtomicU64,

    /// Successful segmentation adapter initializations
    pub adapter_inits: AtomicU64,

    /// Pipelines built
    pub rebuilds: AtomicU64,

    /// Failures while closing a backend
    pub teardown_failures: AtomicU64,

    /// Microseconds since `base` at the last rendered frame
    pub last_frame_time: AtomicU64,
}

impl PipelineHealth {
    /// Create a new health metrics instance
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            ticks_received: AtomicU64::new(0),
            ticks_dropped: AtomicU64::new(0),
            frames_requested: AtomicU64::new(0),
            frames_rendered: AtomicU64::new(0),
            render_failures: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            stale_results: AtomicU64::new(0),
            adapter_inits: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
            teardown_failures: AtomicU64::new(0),
            last_frame_time: AtomicU64::new(0),
        }
    }

    pub fn record_tick(&self) {
        self.ticks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_dropped(&self) {
        self.ticks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request(&self) {
        self.frames_requested.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully composited frame
    pub fn record_frame_rendered(&self) {
        let now_micros = self.base.elapsed().as_micros() as u64;
        self.last_frame_time.store(now_micros, Ordering::Relaxed);
        self.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_render_failure(&self) {
        self.render_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_result(&self) {
        self.stale_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_adapter_init(&self) {
        self.adapter_inits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebuild(&self) {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_teardown_failure(&self) {
        self.teardown_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks_received(&self) -> u64 {
        self.ticks_received.load(Ordering::Relaxed)
    }

    pub fn ticks_dropped(&self) -> u64 {
        self.ticks_dropped.load(Ordering::Relaxed)
    }

    pub fn frames_requested(&self) -> u64 {
        self.frames_requested.load(Ordering::Relaxed)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    pub fn render_failures(&self) -> u64 {
        self.render_failures.load(Ordering::Relaxed)
    }

    pub fn inference_failures(&self) -> u64 {
        self.inference_failures.load(Ordering::Relaxed)
    }

    pub fn stale_results(&self) -> u64 {
        self.stale_results.load(Ordering::Relaxed)
    }

    pub fn adapter_inits(&self) -> u64 {
        self.adapter_inits.load(Ordering::Relaxed)
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    pub fn teardown_failures(&self) -> u64 {
        self.teardown_failures.load(Ordering::Relaxed)
    }

    /// Percentage of ticks that were dropped by backpressure
    pub fn tick_drop_rate(&self) -> f64 {
        let ticks = self.ticks_received();
        if ticks == 0 {
            return 0.0;
        }
        (self.ticks_dropped() as f64 / ticks as f64) * 100.0
    }

    /// Check if no frame has been rendered for the given duration
    ///
    /// The clock starts when the metrics are created.
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let last_frame = self.last_frame_time.load(Ordering::Relaxed);
        let now = self.base.elapsed().as_micros() as u64;
        now.saturating_sub(last_frame) > threshold.as_micros() as u64
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            frames_requested: self.frames_requested(),
            frames_rendered: self.frames_rendered(),
            ticks_dropped: self.ticks_dropped(),
            tick_drop_rate: self.tick_drop_rate(),
            render_failures: self.render_failures(),
            inference_failures: self.inference_failures(),
            stale_results: self.stale_results(),
            adapter_inits: self.adapter_inits(),
            teardown_failures: self.teardown_failures(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipelineHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PipelineHealth").field(&self.summary()).finish()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSummary {
    pub frames_requested: u64,
    pub frames_rendered: u64,
    pub ticks_dropped: u64,
    pub tick_drop_rate: f64,
    pub render_failures: u64,
    pub inference_failures: u64,
    pub stale_results: u64,
    pub adapter_inits: u64,
    pub teardown_failures: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} rendered / {} requested ({} ticks dropped, {:.2}%), {} render failures, {} inference failures, {} stale results, {} adapter inits, {} teardown failures",
            self.frames_rendered,
            self.frames_requested,
            self.ticks_dropped,
            self.tick_drop_rate,
            self.render_failures,
            self.inference_failures,
            self.stale_results,
            self.adapter_inits,
            self.teardown_failures
        )
    }
}
