use crate::error::{ReelError, Result};
use crate::render::Resolution;
use crate::subtitle::SubtitleStyle;
use crate::timing::VoiceConfig;
use crate::visuals::VisualsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    #[default]
    ElevenLabs,
    Stub,
}

impl std::fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TtsProvider::ElevenLabs => write!(f, "elevenlabs"),
            TtsProvider::Stub => write!(f, "stub"),
        }
    }
}

impl std::str::FromStr for TtsProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "elevenlabs" => Ok(TtsProvider::ElevenLabs),
            "stub" => Ok(TtsProvider::Stub),
            _ => Err(format!(
                "Unknown TTS provider: {}. Use 'elevenlabs' or 'stub'",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub api_keys: Vec<String>,
    pub model_id: String,
    pub default_voice_id: String,
    /// Lengthen sentence breaks before synthesis.
    pub add_pauses: bool,
    pub base_url: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProvider::default(),
            api_keys: Vec::new(),
            model_id: "eleven_multilingual_v2".to_string(),
            default_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            add_pauses: false,
            base_url: "https://api.elevenlabs.io".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// SearXNG instance for still images; image search is off without it.
    pub searxng_url: Option<String>,
    /// Giphy key for animated overlays.
    pub giphy_api_key: Option<String>,
    /// Domains blocked in addition to the built-in list.
    pub blocklist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_cues: usize,
    /// JSON file of cues used instead of the LLM.
    pub cues_file: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_cues: 8,
            cues_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub clip_dir: Option<PathBuf>,
}

/// Per-request and per-stage limits, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub tts_secs: u64,
    pub search_secs: u64,
    pub download_secs: u64,
    pub llm_secs: u64,
    pub draft_stage_secs: u64,
    pub synthesize_stage_secs: u64,
    pub stitch_stage_secs: u64,
    pub overlay_stage_secs: u64,
    pub subtitle_stage_secs: u64,
    pub mux_stage_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tts_secs: 120,
            search_secs: 15,
            download_secs: 30,
            llm_secs: 60,
            draft_stage_secs: 120,
            synthesize_stage_secs: 600,
            stitch_stage_secs: 120,
            overlay_stage_secs: 300,
            subtitle_stage_secs: 30,
            mux_stage_secs: 900,
        }
    }
}

impl TimeoutConfig {
    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    fn all(&self) -> [(&'static str, u64); 10] {
        [
            ("tts_secs", self.tts_secs),
            ("search_secs", self.search_secs),
            ("download_secs", self.download_secs),
            ("llm_secs", self.llm_secs),
            ("draft_stage_secs", self.draft_stage_secs),
            ("synthesize_stage_secs", self.synthesize_stage_secs),
            ("stitch_stage_secs", self.stitch_stage_secs),
            ("overlay_stage_secs", self.overlay_stage_secs),
            ("subtitle_stage_secs", self.subtitle_stage_secs),
            ("mux_stage_secs", self.mux_stage_secs),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output size as `"WxH"`.
    pub resolution: String,
    pub visuals: VisualsConfig,
    pub subtitles: SubtitleStyle,
    pub tts: TtsConfig,
    pub voices: Vec<VoiceConfig>,
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub background: BackgroundConfig,
    pub timeouts: TimeoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: Resolution::VERTICAL.to_string(),
            visuals: VisualsConfig::default(),
            subtitles: SubtitleStyle::default(),
            tts: TtsConfig::default(),
            voices: Vec::new(),
            search: SearchConfig::default(),
            llm: LlmConfig::default(),
            background: BackgroundConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or the user config file if none is given, then
    /// apply environment overrides.
    ///
    /// An explicit path must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::config_file_path() {
                Some(default_path) if default_path.exists() => Self::from_file(&default_path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ReelError::InvalidInput(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
            .map_err(|e| ReelError::InvalidInput(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ReelError::InvalidInput(format!("invalid config: {e}")))
    }

    /// Override settings from environment variables, read through `var`.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(keys) = non_empty("ELEVENLABS_API_KEYS") {
            self.tts.api_keys = keys
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        } else if let Some(key) = non_empty("ELEVENLABS_API_KEY") {
            self.tts.api_keys = vec![key.trim().to_string()];
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(key) = non_empty("GIPHY_API_KEY") {
            self.search.giphy_api_key = Some(key);
        }
        if let Some(url) = non_empty("REELSMITH_SEARXNG_URL") {
            self.search.searxng_url = Some(url);
        }
        if let Some(dir) = non_empty("REELSMITH_CLIP_DIR") {
            self.background.clip_dir = Some(PathBuf::from(dir));
        }
    }

    /// Output resolution, falling back to 1080x1920 when malformed.
    pub fn resolution(&self) -> Resolution {
        Resolution::parse_or_default(&self.resolution)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tts.provider == TtsProvider::ElevenLabs
            && self.tts.api_keys.iter().all(|k| k.trim().is_empty())
        {
            return Err(ReelError::InvalidInput(
                "ElevenLabs API key not set. Export ELEVENLABS_API_KEY or ELEVENLABS_API_KEYS=key1,key2"
                    .to_string(),
            ));
        }

        match &self.background.clip_dir {
            None => {
                return Err(ReelError::InvalidInput(
                    "Background clip directory not set. Set [background] clip_dir or REELSMITH_CLIP_DIR"
                        .to_string(),
                ))
            }
            Some(dir) if !dir.is_dir() => {
                return Err(ReelError::InvalidInput(format!(
                    "Background clip directory not found: {}",
                    dir.display()
                )))
            }
            Some(_) => {}
        }

        if let Some((name, _)) = self.timeouts.all().iter().find(|(_, secs)| *secs == 0) {
            return Err(ReelError::InvalidInput(format!(
                "Timeout {name} must be greater than 0"
            )));
        }

        if self.visuals.min_gap < 0.0 || self.visuals.max_display_time < 0.0 {
            return Err(ReelError::InvalidInput(
                "visuals.min_gap and visuals.max_display_time must not be negative".to_string(),
            ));
        }

        for voice in &self.voices {
            if voice.speaker.trim().is_empty() {
                return Err(ReelError::InvalidInput(
                    "Every [[voices]] entry needs a speaker name".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Speaker names from the voice table.
    pub fn speakers(&self) -> Vec<String> {
        self.voices.iter().map(|v| v.speaker.clone()).collect()
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("reelsmith").join("config.toml"))
    }
}
