pub mod sink;
pub mod wav;

pub use sink::{CollectorSink, CommandSink, PlaybackSink, SharedSink};
pub use wav::{AudioContainer, AudioFormat, concat, concat_wav_bytes};
