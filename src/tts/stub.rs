use std::io::Cursor;

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::{ReelError, Result};
use crate::timing::{estimate_word_timings, SpeechResult, VoiceConfig};
use crate::tts::SpeechSynthesizer;

const SAMPLE_RATE: u32 = 16_000;

/// Offline synthesizer producing silence of a plausible length.
///
/// Useful for dry runs and tests: audio is a valid mono 16 kHz WAV and
/// timings come from the estimator.
#[derive(Debug, Clone)]
pub struct StubSynthesizer {
    seconds_per_word: f64,
}

impl Default for StubSynthesizer {
    fn default() -> Self {
        Self {
            seconds_per_word: 0.4,
        }
    }
}

impl StubSynthesizer {
    pub fn with_seconds_per_word(mut self, seconds: f64) -> Self {
        self.seconds_per_word = seconds.max(0.0);
        self
    }

    fn speak(&self, text: &str) -> Result<SpeechResult> {
        let words = text.split_whitespace().count();
        if words == 0 {
            return Err(ReelError::EmptyInput("nothing to synthesize".to_string()));
        }

        let duration = words as f64 * self.seconds_per_word;
        let audio = silent_wav(duration)?;
        Ok(SpeechResult::new(audio, estimate_word_timings(text, duration)))
    }
}

/// Encode `duration` seconds of silence as 16-bit mono WAV.
pub fn silent_wav(duration: f64) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let samples = (duration.max(0.0) * SAMPLE_RATE as f64).round() as u64;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for _ in 0..samples {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[async_trait]
impl SpeechSynthesizer for StubSynthesizer {
    async fn synthesize_with_timings(&self, text: &str) -> Result<SpeechResult> {
        self.speak(text)
    }

    async fn synthesize_with_voice(&self, text: &str, voice: &VoiceConfig) -> Result<SpeechResult> {
        Ok(self.speak(text)?.with_speaker(&voice.speaker))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;

    #[test]
    fn test_silent_wav_is_readable() {
        let bytes = silent_wav(0.5).unwrap();
        assert_eq!(AudioFormat::sniff(&bytes), AudioFormat::Wav);

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.duration(), 8_000);
    }

    #[tokio::test]
    async fn test_stub_timings_cover_audio() {
        let synth = StubSynthesizer::default();
        let result = synth.synthesize_with_timings("one two three").await.unwrap();
        assert_eq!(result.timings().len(), 3);
        assert!((result.duration() - 1.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stub_labels_speaker() {
        let synth = StubSynthesizer::default();
        let voice = VoiceConfig::new("Adam", "v1", "#00BFFF");
        let result = synth.synthesize_with_voice("hello there", &voice).await.unwrap();
        assert!(result.timings().iter().all(|t| t.speaker == "Adam"));
    }

    #[tokio::test]
    async fn test_stub_rejects_empty_text() {
        let synth = StubSynthesizer::default();
        assert!(matches!(
            synth.synthesize("  ").await,
            Err(ReelError::EmptyInput(_))
        ));
    }
}
