//! Pipeline state management

use std::time::Instant;

use super::types::Generation;

/// Pipeline state machine
///
/// `Idle` means no scheduler, adapter or surface exists. `Running` means a
/// fully wired generation is producing frames. A rebuild passes through
/// `Idle` while the previous generation is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No active pipeline
    Idle,

    /// Pipeline is actively compositing frames
    Running {
        /// When this generation started running
        started_at: Instant,
        /// Generation that owns the running pipeline
        generation: Generation,
    },
}

impl PipelineState {
    pub fn running(generation: Generation) -> Self {
        PipelineState::Running {
            started_at: Instant::now(),
            generation,
        }
    }

    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Idle, Idle) => true,
            (Idle, Running { .. }) => true,
            (Running { .. }, Idle) => true,

            // A generation only ever runs once; a rebuild goes through Idle
            (Running { generation: a, .. }, Running { generation: b, .. }) => a == b,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Running { .. } => "Running",
        }
    }

    /// Check if the pipeline is running
    pub fn is_running(&self) -> bool {
        matches!(self, PipelineState::Running { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PipelineState::Idle)
    }

    /// Generation of the running pipeline, if any
    pub fn generation(&self) -> Option<Generation> {
        match self {
            PipelineState::Running { generation, .. } => Some(*generation),
            PipelineState::Idle => None,
        }
    }

    /// Get the duration since the pipeline started (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let PipelineState::Running { started_at, .. } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Running { generation, .. } => write!(f, "Running({generation})"),
        }
    }
}
