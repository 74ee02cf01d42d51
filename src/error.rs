//! Error taxonomy for the effect pipeline
//!
//! Setup-path errors (`Config`, `EngineInit`, `Resource`) abort a reconfigure
//! and reach the caller. Per-frame errors (`FrameRender`) and shutdown errors
//! (`Teardown`) are logged where they happen and never escape the pipeline.

pub type EffectResult<T> = Result<T, EffectError>;

#[derive(thiserror::Error, Debug)]
pub enum EffectError {
    /// Missing or invalid source, effect kind or dimensions
    #[error("config error: {0}")]
    Config(String),

    /// The segmentation backend could not be constructed or initialized
    #[error("engine init error: {0}")]
    EngineInit(String),

    /// The render surface could not be allocated
    #[error("resource error: {0}")]
    Resource(String),

    /// A single composite pass failed (e.g. malformed frame)
    #[error("frame render error: {0}")]
    FrameRender(String),

    /// Closing the backend failed
    #[error("teardown error: {0}")]
    Teardown(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EffectError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn engine_init(msg: impl Into<String>) -> Self {
        Self::EngineInit(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn frame_render(msg: impl Into<String>) -> Self {
        Self::FrameRender(msg.into())
    }

    pub fn teardown(msg: impl Into<String>) -> Self {
        Self::Teardown(msg.into())
    }

    /// Whether this error aborts a reconfigure (as opposed to a dropped frame)
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::EngineInit(_) | Self::Resource(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(EffectError::config("x").to_string().contains("config error:"));
        assert!(
            EffectError::engine_init("x")
                .to_string()
                .contains("engine init error:")
        );
        assert!(
            EffectError::resource("x")
                .to_string()
                .contains("resource error:")
        );
        assert!(
            EffectError::frame_render("x")
                .to_string()
                .contains("frame render error:")
        );
        assert!(
            EffectError::teardown("x")
                .to_string()
                .contains("teardown error:")
        );
    }

    #[test]
    fn setup_errors_are_classified() {
        assert!(EffectError::config("x").is_setup_error());
        assert!(EffectError::engine_init("x").is_setup_error());
        assert!(EffectError::resource("x").is_setup_error());
        assert!(!EffectError::frame_render("x").is_setup_error());
        assert!(!EffectError::teardown("x").is_setup_error());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = EffectError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
