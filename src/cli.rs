//! Command-line interface for pipertray
//!
//! Provides argument parsing using clap derive macros.

use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Chunked parallel text-to-speech on top of piper
#[derive(Parser, Debug)]
#[command(
    name = "pipertray",
    version,
    about = "Chunked parallel text-to-speech on top of piper"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: progress, -vv: per-chunk diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Voice overrides shared by commands that synthesize.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct VoiceArgs {
    /// Voice model file (.onnx)
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Speaking speed from 1 (slowest) to 10 (fastest)
    #[arg(long, value_name = "1-10", value_parser = clap::value_parser!(u8).range(1..=10))]
    pub speed: Option<u8>,

    /// Speaker index for multi-speaker models
    #[arg(long, value_name = "ID")]
    pub speaker: Option<u32>,

    /// Minimum per-chunk synthesis timeout. Examples: 3, 5s, 1500ms
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout_floor: Option<Duration>,
}

impl VoiceArgs {
    /// Apply the overrides that were given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.voice.model = model.clone();
        }
        if let Some(speed) = self.speed {
            config.voice.speed = speed;
        }
        if let Some(speaker) = self.speaker {
            config.voice.speaker_id = speaker;
        }
        if let Some(floor) = self.timeout_floor {
            config.synthesis.timeout_floor_ms = u64::try_from(floor.as_millis()).unwrap_or(u64::MAX);
        }
    }
}

/// Parse a timeout string.
///
/// Supports any duration format accepted by `humantime`; a bare number is
/// taken as seconds.
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Speak text aloud (reads stdin when TEXT is omitted)
    Speak {
        /// Text to speak
        text: Option<String>,

        #[command(flatten)]
        voice: VoiceArgs,
    },

    /// Synthesize text into a WAV file
    Export {
        /// Text to synthesize (reads stdin when omitted)
        text: Option<String>,

        /// Output WAV file
        #[arg(long, short = 'o', value_name = "FILE")]
        output: PathBuf,

        #[command(flatten)]
        voice: VoiceArgs,
    },

    /// Show how text would be split into chunks
    Segment {
        /// Text to segment (reads stdin when omitted)
        text: Option<String>,

        /// Also show the language detected for each sentence
        #[arg(long)]
        languages: bool,

        /// Override the maximum chunk length in bytes
        #[arg(long, value_name = "BYTES")]
        max_chunk_len: Option<usize>,
    },

    /// View and create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
