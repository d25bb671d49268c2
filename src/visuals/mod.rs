pub mod fetcher;
pub mod locator;
pub mod media;

pub use fetcher::{enforce_constraints, VisualFetcher, MIN_ON_SCREEN};
pub use locator::{clean_word, locate_keyword, locate_keyword_from};
pub use media::{extension_for, validate_media};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of media a cue asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MediaKind {
    #[default]
    #[serde(rename = "image", alias = "still", alias = "IMAGE")]
    Image,
    #[serde(rename = "gif", alias = "animated", alias = "GIF")]
    Animated,
}

impl MediaKind {
    /// Smallest download accepted for this kind, in bytes.
    pub fn min_bytes(&self) -> usize {
        match self {
            MediaKind::Image => 10_000,
            MediaKind::Animated => 5_000,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Animated => write!(f, "gif"),
        }
    }
}

/// Instruction to place a visual while a keyword is being spoken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualCue {
    /// Word or phrase expected in the narration.
    pub keyword: String,
    /// What to search for; may differ from the keyword.
    #[serde(default)]
    pub search_query: String,
    #[serde(default, rename = "type", alias = "media_type")]
    pub media_type: MediaKind,
}

impl VisualCue {
    pub fn new(keyword: impl Into<String>, search_query: impl Into<String>, media_type: MediaKind) -> Self {
        Self {
            keyword: keyword.into(),
            search_query: search_query.into(),
            media_type,
        }
    }
}

/// A fetched visual placed on the narration timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageOverlay {
    pub path: PathBuf,
    pub start: f64,
    pub end: f64,
    pub width: u32,
    pub height: u32,
    pub animated: bool,
}

/// Placement settings for overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualsConfig {
    /// Longest an overlay stays up, in seconds; 0 disables the limit.
    pub max_display_time: f64,
    pub image_width: u32,
    pub image_height: u32,
    /// Gap kept between consecutive overlays, in seconds.
    pub min_gap: f64,
}

impl Default for VisualsConfig {
    fn default() -> Self {
        Self {
            max_display_time: 3.0,
            image_width: 800,
            image_height: 800,
            min_gap: 0.5,
        }
    }
}
