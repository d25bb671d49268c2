pub mod ass;

pub use ass::{format_ass_time, render, to_ass_color};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::timing::{VoiceConfig, WordTiming};

/// One word on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtitle {
    pub text: String,
    pub start: f64,
    pub end: f64,
    /// Colour override as `#RRGGBB`; the style's colour applies when unset.
    pub color: Option<String>,
}

/// Look of the burned-in subtitles, loaded from the `[subtitles]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub font_name: String,
    pub font_size: u32,
    pub primary_color: String,
    pub outline_color: String,
    pub outline_size: u32,
    pub shadow_size: u32,
    pub bold: bool,
    /// Seconds added to every event; may be negative.
    pub offset: f64,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 80,
            primary_color: "#FFFFFF".to_string(),
            outline_color: "#000000".to_string(),
            outline_size: 4,
            shadow_size: 0,
            bold: true,
            offset: 0.0,
        }
    }
}

/// Speaker name to subtitle colour, from the voice table.
pub fn color_map(voices: &[VoiceConfig]) -> HashMap<String, String> {
    voices
        .iter()
        .map(|v| (v.speaker.clone(), v.color.clone()))
        .collect()
}

/// One event per word, each getting an equal share of `duration`.
pub fn subtitles_from_text(text: &str, duration: f64) -> Vec<Subtitle> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let slice = duration.max(0.0) / words.len() as f64;
    words
        .iter()
        .enumerate()
        .map(|(i, word)| Subtitle {
            text: word.to_string(),
            start: i as f64 * slice,
            end: (i + 1) as f64 * slice,
            color: None,
        })
        .collect()
}

/// One event per timed word, coloured by speaker when a map is given.
pub fn subtitles_from_timings(
    timings: &[WordTiming],
    colors: Option<&HashMap<String, String>>,
) -> Vec<Subtitle> {
    let subtitles = timings
        .iter()
        .map(|t| Subtitle {
            text: t.word.clone(),
            start: t.start,
            end: t.end,
            color: colors.and_then(|map| map.get(&t.speaker).cloned()),
        })
        .collect();

    fix_overlapping_timestamps(subtitles)
}

/// Shift every event by `offset` seconds, never before 0.
pub fn apply_offset(subtitles: &mut [Subtitle], offset: f64) {
    if offset == 0.0 {
        return;
    }
    for subtitle in subtitles {
        subtitle.start = (subtitle.start + offset).max(0.0);
        subtitle.end = (subtitle.end + offset).max(0.0);
    }
}

/// Clip any event that runs into the next one.
fn fix_overlapping_timestamps(subtitles: Vec<Subtitle>) -> Vec<Subtitle> {
    let mut result: Vec<Subtitle> = Vec::with_capacity(subtitles.len());

    for subtitle in subtitles {
        if let Some(last) = result.last_mut() {
            if subtitle.start < last.end {
                last.end = subtitle.start.max(last.start);
            }
        }
        result.push(subtitle);
    }

    result
}
