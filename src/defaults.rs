//! Default configuration constants for pipertray.
//!
//! Shared by the config layer and by the components that can be built
//! without a config file (tests, the library API).

/// Output sample rate of the synthesis backend in Hz.
pub const SAMPLE_RATE: u32 = 22050;

/// Bits per sample of the backend's raw PCM output.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Channel count of the backend's raw PCM output.
pub const CHANNELS: u16 = 1;

/// Maximum chunk length in bytes handed to one synthesis call.
///
/// Also the single-chunk threshold: text at or below this length is
/// synthesized and played without the streaming machinery.
pub const MAX_CHUNK_LEN: usize = 800;

/// Simultaneous synthesis calls admitted after the first chunk.
///
/// The first chunk never waits for admission, so up to
/// `MAX_CONCURRENCY + 1` backend processes may run at once.
pub const MAX_CONCURRENCY: usize = 3;

/// Lower bound for a single synthesis call's timeout.
pub const TIMEOUT_FLOOR_MS: u64 = 3000;

/// Timeout budget per character of input text.
pub const TIMEOUT_PER_CHAR_MS: u64 = 15;

/// Default speaking speed on the 1 (slowest) to 10 (fastest) scale.
pub const DEFAULT_SPEED: u8 = 5;

/// Minimum language score for a sentence to be assigned that language.
pub const LANGUAGE_THRESHOLD: f64 = 0.05;

/// Weight of the character-set score in language detection.
pub const CHAR_WEIGHT: f64 = 0.4;

/// Weight of the common-word score in language detection.
pub const WORD_WEIGHT: f64 = 0.6;

/// Language that receives plain-ASCII sentences when nothing else matches.
pub const DEFAULT_LANGUAGE: &str = "en";

/// How often blocking playback and queue waits check for cancellation.
pub const POLL_INTERVAL_MS: u64 = 20;

/// Grace period between asking a backend process to stop and killing it.
pub const KILL_GRACE_MS: u64 = 500;

/// Default synthesis backend executable.
pub const BACKEND_EXECUTABLE: &str = "piper";

/// Default playback command; reads a WAV container on stdin.
pub const PLAYBACK_COMMAND: &str = "aplay";
