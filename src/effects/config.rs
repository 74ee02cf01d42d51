use std::sync::Arc;

use crate::capture::{SourceId, VideoSource};
use crate::error::{EffectError, EffectResult};

use super::{BlurLevel, EffectKind};

/// Fully resolved configuration of one pipeline
#[derive(Clone)]
pub struct EffectConfig {
    pub source: Arc<dyn VideoSource>,
    pub width: u32,
    pub height: u32,
    pub effect: EffectKind,
    /// Flip the composited output horizontally
    pub mirror: bool,
}

impl EffectConfig {
    pub fn new(source: Arc<dyn VideoSource>, width: u32, height: u32, effect: EffectKind) -> Self {
        Self {
            source,
            width,
            height,
            effect,
            mirror: false,
        }
    }

    pub fn blur(source: Arc<dyn VideoSource>, width: u32, height: u32, level: BlurLevel) -> Self {
        Self::new(source, width, height, EffectKind::Blur(level))
    }

    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn source_id(&self) -> SourceId {
        self.source.id()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether moving from `prior` to `self` needs a fresh pipeline.
    /// Only stream identity and surface size count; effect parameters never do.
    pub fn requires_rebuild(&self, prior: Option<&EffectConfig>) -> bool {
        match prior {
            None => true,
            Some(prior) => {
                prior.source_id() != self.source_id() || prior.dimensions() != self.dimensions()
            }
        }
    }
}

impl std::fmt::Debug for EffectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectConfig")
            .field("source", &self.source_id())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("effect", &self.effect)
            .field("mirror", &self.mirror)
            .finish()
    }
}

/// Partial configuration merged over the last accepted one
#[derive(Clone, Default)]
pub struct EffectUpdate {
    pub source: Option<Arc<dyn VideoSource>>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub effect: Option<EffectKind>,
    pub mirror: Option<bool>,
}

impl EffectUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: Arc<dyn VideoSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn effect(mut self, effect: EffectKind) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn blur(self, level: BlurLevel) -> Self {
        self.effect(EffectKind::Blur(level))
    }

    pub fn mirror(mut self, mirror: bool) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Merge over `prior`, falling back to `default_size` for dimensions
    pub fn resolve(
        self,
        prior: Option<&EffectConfig>,
        default_size: (u32, u32),
    ) -> EffectResult<EffectConfig> {
        let source = self
            .source
            .or_else(|| prior.map(|p| p.source.clone()))
            .ok_or_else(|| EffectError::config("no source stream"))?;

        let effect = self
            .effect
            .or_else(|| prior.map(|p| p.effect.clone()))
            .ok_or_else(|| EffectError::config("no effect kind"))?;

        let (width, height) = match (self.width, self.height) {
            (Some(w), Some(h)) => (w, h),
            (None, None) => prior.map(EffectConfig::dimensions).unwrap_or(default_size),
            _ => {
                return Err(EffectError::config(
                    "width and height must be given together",
                ));
            }
        };
        if width == 0 || height == 0 {
            return Err(EffectError::config(format!(
                "invalid dimensions {width}x{height}"
            )));
        }

        let mirror = self
            .mirror
            .or_else(|| prior.map(|p| p.mirror))
            .unwrap_or(false);

        Ok(EffectConfig {
            source,
            width,
            height,
            effect,
            mirror,
        })
    }
}

impl From<EffectConfig> for EffectUpdate {
    fn from(config: EffectConfig) -> Self {
        Self {
            source: Some(config.source),
            width: Some(config.width),
            height: Some(config.height),
            effect: Some(config.effect),
            mirror: Some(config.mirror),
        }
    }
}
