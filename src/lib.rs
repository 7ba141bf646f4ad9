//! pipertray - chunked parallel text-to-speech on top of piper
//!
//! Long text is split into chunks, synthesized by several backend processes
//! at once, and played back in order while later chunks are still rendering.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod synth;
pub mod sys;
pub mod text;

// Core traits (text → synthesis → playback)
pub use audio::sink::PlaybackSink;
pub use synth::backend::SynthesisBackend;

// Pipeline
pub use pipeline::controller::{PipelineController, PipelineSettings};
pub use pipeline::types::SpeakOutcome;

// Audio
pub use audio::wav::AudioContainer;

// Error handling
pub use error::{PipertrayError, Result};

// Config
pub use config::Config;

pub use pipeline::error::ErrorReporter;
