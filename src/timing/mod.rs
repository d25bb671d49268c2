pub mod alignment;

pub use alignment::{extract_word_timings, CharacterAlignment};

use serde::{Deserialize, Serialize};

/// Nominal bitrate used when nothing better than the byte length is known.
const NOMINAL_BITRATE_BPS: f64 = 128_000.0;

/// A word as pronounced, timed in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    /// The word as written in the script, punctuation included.
    pub word: String,
    pub start: f64,
    pub end: f64,
    /// Speaker label; empty for single-voice narration.
    #[serde(default)]
    pub speaker: String,
}

impl WordTiming {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
            speaker: String::new(),
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = speaker.into();
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Audio for one segment of speech together with its word timings.
///
/// The two halves are only ever produced and consumed together.
#[derive(Debug, Clone)]
pub struct SpeechResult {
    audio: Vec<u8>,
    timings: Vec<WordTiming>,
}

impl SpeechResult {
    pub fn new(audio: Vec<u8>, timings: Vec<WordTiming>) -> Self {
        Self { audio, timings }
    }

    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    pub fn timings(&self) -> &[WordTiming] {
        &self.timings
    }

    /// End of the last word, or 0 when there are no timings.
    pub fn duration(&self) -> f64 {
        last_end(&self.timings)
    }

    /// Label every timing with the given speaker.
    pub fn with_speaker(mut self, speaker: &str) -> Self {
        for timing in &mut self.timings {
            timing.speaker = speaker.to_string();
        }
        self
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<WordTiming>) {
        (self.audio, self.timings)
    }
}

/// A speaker identity: script name, backend voice and subtitle colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Name used in script markup and timing labels.
    pub speaker: String,
    /// Backend-specific voice identifier.
    pub voice_id: String,
    /// Subtitle colour as `#RRGGBB`.
    #[serde(default = "default_voice_color")]
    pub color: String,
}

fn default_voice_color() -> String {
    "#FFFFFF".to_string()
}

impl VoiceConfig {
    pub fn new(
        speaker: impl Into<String>,
        voice_id: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            speaker: speaker.into(),
            voice_id: voice_id.into(),
            color: color.into(),
        }
    }
}

/// End time of the last timing, or 0.
pub fn last_end(timings: &[WordTiming]) -> f64 {
    timings.last().map(|t| t.end).unwrap_or(0.0)
}

/// Spread `duration` over the words of `text`, giving longer words more time.
///
/// Words are contiguous, start at 0 and the last one ends exactly at
/// `duration`.
pub fn estimate_word_timings(text: &str, duration: f64) -> Vec<WordTiming> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let duration = duration.max(0.0);
    let avg = duration / words.len() as f64;

    let mut timings = Vec::with_capacity(words.len());
    let mut cursor = 0.0;
    for word in &words {
        let len = word.chars().count() as f64;
        let word_duration = avg * (0.8 + 0.4 * len / 5.0);
        let end = cursor + word_duration;
        timings.push(WordTiming::new(*word, cursor, end));
        cursor = end;
    }

    if cursor > 0.0 && cursor != duration {
        let scale = duration / cursor;
        for timing in &mut timings {
            timing.start *= scale;
            timing.end *= scale;
        }
    }

    if let Some(last) = timings.last_mut() {
        last.end = duration;
    }

    timings
}

/// Coarse duration estimate for an audio blob of unknown format.
pub fn estimate_duration_from_bytes(audio: &[u8]) -> f64 {
    audio.len() as f64 * 8.0 / NOMINAL_BITRATE_BPS
}

/// Lengthen sentence breaks so the voice pauses between sentences.
///
/// `". "`, `"! "` and `"? "` gain an ellipsis; an existing `"..."` is left
/// alone. No whitespace is added, so the token count is unchanged.
pub fn add_pauses(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);

    for (i, &c) in chars.iter().enumerate() {
        let before_space = chars.get(i + 1) == Some(&' ');
        match c {
            '.' if before_space => {
                if i > 0 && chars[i - 1] == '.' {
                    out.push('.');
                } else {
                    out.push_str("...");
                }
            }
            '!' | '?' if before_space => {
                out.push(c);
                out.push_str("...");
            }
            _ => out.push(c),
        }
    }

    out
}

/// End time of the speaker turn that contains `timings[index]`.
///
/// Walks forward while the speaker label stays the same. An empty label
/// never ends the turn. Out-of-range indices yield 0.
pub fn speaker_segment_end(timings: &[WordTiming], index: usize) -> f64 {
    let Some(first) = timings.get(index) else {
        return 0.0;
    };

    let speaker = first.speaker.as_str();
    let mut end = first.end;

    for timing in &timings[index + 1..] {
        if !speaker.is_empty() && timing.speaker != speaker {
            break;
        }
        end = timing.end;
    }

    end
}
