//! Data types shared by the streaming coordinator and the controller.

use crate::audio::wav::AudioContainer;
use crate::error::PipertrayError;
use std::fmt;

/// One message on the producer → consumer playback queue.
#[derive(Debug)]
pub enum StreamMessage {
    /// The next container in input order. May be empty; empty items are skipped.
    Item(AudioContainer),
    /// Every chunk has been delivered.
    Done,
    /// Synthesis failed; nothing further will arrive.
    Failed(PipertrayError),
}

/// Lifecycle of one streaming run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No run in progress; also where a run that played to the end returns.
    Idle,
    /// Chunks are being synthesized while earlier ones play.
    Generating,
    /// Synthesis is complete; queued audio is still playing.
    Draining,
    Cancelled,
    Failed,
}

impl StreamState {
    /// True while audio is still being produced or played.
    pub fn is_active(self) -> bool {
        matches!(self, StreamState::Generating | StreamState::Draining)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::Generating => "generating",
            StreamState::Draining => "draining",
            StreamState::Cancelled => "cancelled",
            StreamState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a `speak` call ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// All audio played to the end.
    Completed,
    /// A newer request or an explicit stop cut this run short.
    Cancelled,
}
