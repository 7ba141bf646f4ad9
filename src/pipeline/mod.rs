//! Speech pipeline: chunked synthesis feeding ordered, streaming playback.
//!
//! The controller plans a run (segmentation, optional per-language voices),
//! synthesizes through the scheduler, and either plays a single chunk directly
//! or hands the run to the streaming coordinator.

pub mod controller;
pub mod error;
pub mod stream;
pub mod types;

pub use controller::{PipelineController, PipelineSettings, VoiceRouting};
pub use error::{ErrorReporter, LogReporter};
pub use stream::{StreamCoordinator, StreamHandle, play_blocking};
pub use types::{SpeakOutcome, StreamMessage, StreamState};
