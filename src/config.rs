use crate::audio::sink::CommandSink;
use crate::defaults;
use crate::error::{PipertrayError, Result};
use crate::pipeline::controller::{PipelineSettings, VoiceRouting};
use crate::synth::piper::PiperConfig;
use crate::synth::request::{TimeoutPolicy, VoiceProfile};
use crate::text::language::{DetectionWeights, Language, LanguageDetector};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub voice: VoiceProfile,
    pub languages: LanguagesConfig,
    pub synthesis: SynthesisConfig,
    pub detection: DetectionWeights,
    pub playback: PlaybackConfig,
}

/// Synthesis backend process configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub executable: PathBuf,
    /// Placed before the generated arguments.
    pub extra_args: Vec<String>,
}

/// Language switching configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LanguagesConfig {
    pub enabled: bool,
    pub default_language: Language,
    /// Ordered; earlier languages win score ties.
    pub voices: Vec<LanguageVoice>,
}

/// Voice used for text detected as one language
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageVoice {
    pub language: Language,
    pub model: PathBuf,
    #[serde(default)]
    pub speaker_id: u32,
    #[serde(default = "default_speed")]
    pub speed: u8,
}

/// Chunking, concurrency and timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub max_chunk_len: usize,
    pub max_concurrency: usize,
    pub timeout_floor_ms: u64,
    pub timeout_per_char_ms: u64,
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub command: String,
    pub args: Vec<String>,
    pub poll_interval_ms: u64,
}

fn default_speed() -> u8 {
    defaults::DEFAULT_SPEED
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(defaults::BACKEND_EXECUTABLE),
            extra_args: Vec::new(),
        }
    }
}

impl Default for LanguagesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_language: Language::from_code(defaults::DEFAULT_LANGUAGE)
                .unwrap_or(Language::English),
            voices: Vec::new(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: defaults::MAX_CHUNK_LEN,
            max_concurrency: defaults::MAX_CONCURRENCY,
            timeout_floor_ms: defaults::TIMEOUT_FLOOR_MS,
            timeout_per_char_ms: defaults::TIMEOUT_PER_CHAR_MS,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            command: defaults::PLAYBACK_COMMAND.to_string(),
            args: vec!["-q".to_string(), "-".to_string()],
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
        }
    }
}

impl LanguageVoice {
    pub fn profile(&self) -> VoiceProfile {
        VoiceProfile {
            model: self.model.clone(),
            speaker_id: self.speaker_id,
            speed: self.speed,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipertrayError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                PipertrayError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(PipertrayError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - PIPERTRAY_BACKEND → backend.executable
    /// - PIPERTRAY_MODEL → voice.model
    /// - PIPERTRAY_SPEED → voice.speed (ignored unless it parses)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(backend) = std::env::var("PIPERTRAY_BACKEND")
            && !backend.is_empty()
        {
            self.backend.executable = PathBuf::from(backend);
        }

        if let Ok(model) = std::env::var("PIPERTRAY_MODEL")
            && !model.is_empty()
        {
            self.voice.model = PathBuf::from(model);
        }

        if let Ok(speed) = std::env::var("PIPERTRAY_SPEED")
            && let Ok(speed) = speed.trim().parse::<u8>()
        {
            self.voice.speed = speed;
        }

        self
    }

    /// Check values that parse fine but cannot work.
    pub fn validate(&self) -> Result<()> {
        check_speed("voice.speed", self.voice.speed)?;
        for voice in &self.languages.voices {
            check_speed(&format!("languages.voices.{}.speed", voice.language), voice.speed)?;
        }
        if self.synthesis.max_chunk_len == 0 {
            return Err(invalid("synthesis.max_chunk_len", "must be greater than zero"));
        }
        if self.synthesis.max_concurrency == 0 {
            return Err(invalid("synthesis.max_concurrency", "must be at least 1"));
        }
        if self.playback.poll_interval_ms == 0 {
            return Err(invalid("playback.poll_interval_ms", "must be greater than zero"));
        }
        if self.playback.command.trim().is_empty() {
            return Err(invalid("playback.command", "must not be empty"));
        }
        let weights = &self.detection;
        if weights.char_weight < 0.0 || weights.word_weight < 0.0 || weights.threshold < 0.0 {
            return Err(invalid("detection", "weights and threshold must not be negative"));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/pipertray/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("pipertray").join("config.toml"))
            .ok_or_else(|| PipertrayError::Other("Could not determine config directory".to_string()))
    }

    /// Serialize to TOML, e.g. for `config show` and `config init`.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PipertrayError::ConfigParse {
            message: e.to_string(),
        })
    }

    pub fn timeouts(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            floor: Duration::from_millis(self.synthesis.timeout_floor_ms),
            per_char: Duration::from_millis(self.synthesis.timeout_per_char_ms),
        }
    }

    /// Language detector over the configured voices, in configuration order.
    pub fn detector(&self) -> LanguageDetector {
        let mut enabled: Vec<Language> = Vec::new();
        for voice in &self.languages.voices {
            if !enabled.contains(&voice.language) {
                enabled.push(voice.language);
            }
        }
        LanguageDetector::new(enabled)
            .with_default_language(Some(self.languages.default_language))
            .with_weights(self.detection)
    }

    /// Per-language routing, if language switching is on and has voices.
    pub fn routing(&self) -> Option<VoiceRouting> {
        if !self.languages.enabled {
            return None;
        }
        let voices = self
            .languages
            .voices
            .iter()
            .map(|v| (v.language, v.profile()))
            .collect();
        VoiceRouting::new(self.detector(), voices)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            voice: self.voice.clone(),
            max_chunk_len: self.synthesis.max_chunk_len,
            max_concurrency: self.synthesis.max_concurrency,
            timeouts: self.timeouts(),
            poll_interval: Duration::from_millis(self.playback.poll_interval_ms),
            routing: self.routing(),
        }
    }

    pub fn piper_config(&self) -> PiperConfig {
        PiperConfig {
            executable: self.backend.executable.clone(),
            extra_args: self.backend.extra_args.clone(),
            ..PiperConfig::default()
        }
    }

    pub fn playback_sink(&self) -> CommandSink {
        CommandSink::new(self.playback.command.clone(), self.playback.args.clone())
    }
}

fn invalid(key: &str, message: &str) -> PipertrayError {
    PipertrayError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn check_speed(key: &str, speed: u8) -> Result<()> {
    if (1..=10).contains(&speed) {
        Ok(())
    } else {
        Err(invalid(key, &format!("{} is outside 1..=10", speed)))
    }
}
