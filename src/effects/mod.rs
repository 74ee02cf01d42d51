//! Effects module
//!
//! Describes what the compositor paints behind the segmented subject.

mod background;
mod config;

pub use background::BackgroundImage;
pub use config::{EffectConfig, EffectUpdate};

use log::warn;
use serde::{Deserialize, Serialize};

/// Background blur strength
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum BlurLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl BlurLevel {
    /// Gaussian blur radius in pixels (standard deviation, as in a CSS `blur()`)
    pub fn radius_px(self) -> u32 {
        match self {
            BlurLevel::Low => 10,
            BlurLevel::Medium => 20,
            BlurLevel::High => 30,
        }
    }

    /// Lenient parse: unknown names fall back to `Medium`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => BlurLevel::Low,
            "medium" => BlurLevel::Medium,
            "high" => BlurLevel::High,
            other => {
                warn!("unknown blur level {other:?}, using medium");
                BlurLevel::Medium
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlurLevel::Low => "low",
            BlurLevel::Medium => "medium",
            BlurLevel::High => "high",
        }
    }
}

impl From<String> for BlurLevel {
    fn from(name: String) -> Self {
        BlurLevel::parse(&name)
    }
}

impl From<&str> for BlurLevel {
    fn from(name: &str) -> Self {
        BlurLevel::parse(name)
    }
}

impl std::fmt::Display for BlurLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effect applied outside the subject silhouette
#[derive(Clone)]
pub enum EffectKind {
    /// Gaussian-blurred copy of the input frame
    Blur(BlurLevel),
    /// Static image, stretched to the surface
    Replace(BackgroundImage),
}

impl EffectKind {
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Blur(_) => "blur",
            EffectKind::Replace(_) => "replace",
        }
    }
}

impl std::fmt::Debug for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectKind::Blur(level) => f.debug_tuple("Blur").field(level).finish(),
            EffectKind::Replace(image) => f
                .debug_tuple("Replace")
                .field(&format_args!("{}x{}", image.width(), image.height()))
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blur_radius_table() {
        assert_eq!(BlurLevel::Low.radius_px(), 10);
        assert_eq!(BlurLevel::Medium.radius_px(), 20);
        assert_eq!(BlurLevel::High.radius_px(), 30);
        assert_eq!(BlurLevel::default(), BlurLevel::Medium);
    }

    #[test]
    fn test_unknown_level_defaults_to_medium() {
        assert_eq!(BlurLevel::parse("HIGH"), BlurLevel::High);
        assert_eq!(BlurLevel::parse(" low "), BlurLevel::Low);
        assert_eq!(BlurLevel::parse("extreme"), BlurLevel::Medium);
        assert_eq!(BlurLevel::parse(""), BlurLevel::Medium);
    }

    #[test]
    fn test_level_serde_is_lenient() {
        let level: BlurLevel = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(level, BlurLevel::High);
        let level: BlurLevel = serde_json::from_str("\"ultra\"").unwrap();
        assert_eq!(level, BlurLevel::Medium);
        assert_eq!(serde_json::to_string(&BlurLevel::Low).unwrap(), "\"low\"");
    }
}
