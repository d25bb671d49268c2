pub mod stitch;

pub use stitch::{concat_list, rebase_timings, stitch_segments, StitchedAudio};

/// Container format of an audio blob, detected from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Unknown,
}

impl AudioFormat {
    /// Detect the format from magic bytes.
    ///
    /// `RIFF` is WAV; an `ID3` tag or an MPEG frame sync (`0xFF` followed by
    /// the top three bits set) is MP3.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"RIFF") {
            AudioFormat::Wav
        } else if bytes.starts_with(b"ID3")
            || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0)
        {
            AudioFormat::Mp3
        } else {
            AudioFormat::Unknown
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => ".wav",
            AudioFormat::Mp3 => ".mp3",
            AudioFormat::Unknown => ".bin",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioFormat::Wav => write!(f, "wav"),
            AudioFormat::Mp3 => write!(f, "mp3"),
            AudioFormat::Unknown => write!(f, "unknown"),
        }
    }
}
