//! Speech synthesis: requests, backends and the ordered parallel scheduler.

pub mod backend;
pub mod piper;
pub mod request;
pub mod scheduler;

pub use backend::{MockBackend, SynthesisBackend};
pub use piper::{PiperBackend, PiperConfig};
pub use request::{SynthesisRequest, TimeoutPolicy, VoiceProfile, pacing_for_speed};
pub use scheduler::{OrderedResults, Scheduler};
