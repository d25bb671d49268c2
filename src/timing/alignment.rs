use serde::{Deserialize, Serialize};

use super::{estimate_word_timings, WordTiming};

/// Per-character timing as returned by the TTS timestamps endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterAlignment {
    pub characters: Vec<String>,
    pub character_start_times_seconds: Vec<f64>,
    pub character_end_times_seconds: Vec<f64>,
}

impl CharacterAlignment {
    /// Number of usable entries (the three arrays may disagree in length).
    pub fn len(&self) -> usize {
        self.characters
            .len()
            .min(self.character_start_times_seconds.len())
            .min(self.character_end_times_seconds.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Latest end time in the alignment.
    pub fn end_time(&self) -> f64 {
        self.character_end_times_seconds[..self.len()]
            .iter()
            .copied()
            .fold(0.0, f64::max)
    }
}

fn is_separator(c: &str) -> bool {
    matches!(c, " " | "\n" | "\t")
}

/// Collapse a character alignment into one timing per whitespace token.
///
/// Words are matched to characters purely by non-whitespace character
/// count, so punctuation normalised differently by the vendor is harmless.
/// When the alignment is missing or yields nothing, timings are estimated
/// over the alignment's end time, or `fallback_duration` if it has none.
pub fn extract_word_timings(
    text: &str,
    alignment: Option<&CharacterAlignment>,
    fallback_duration: f64,
) -> Vec<WordTiming> {
    let Some(alignment) = alignment.filter(|a| !a.is_empty()) else {
        return estimate_word_timings(text, fallback_duration);
    };

    let timings = map_characters(text, alignment);
    if timings.is_empty() {
        let duration = match alignment.end_time() {
            d if d > 0.0 => d,
            _ => fallback_duration,
        };
        return estimate_word_timings(text, duration);
    }

    timings
}

fn map_characters(text: &str, alignment: &CharacterAlignment) -> Vec<WordTiming> {
    let n = alignment.len();
    let chars = &alignment.characters;
    let starts = &alignment.character_start_times_seconds;
    let ends = &alignment.character_end_times_seconds;

    let mut timings = Vec::new();
    let mut char_idx = 0;

    for word in text.split_whitespace() {
        while char_idx < n && is_separator(&chars[char_idx]) {
            char_idx += 1;
        }
        if char_idx >= n {
            break;
        }

        let start_idx = char_idx;
        let target = word.chars().count();
        let mut consumed = 0;
        while char_idx < n && consumed < target {
            if !is_separator(&chars[char_idx]) {
                consumed += 1;
            }
            char_idx += 1;
        }

        timings.push(WordTiming::new(word, starts[start_idx], ends[char_idx - 1]));
    }

    timings
}
