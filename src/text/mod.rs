//! Text preparation: size-bounded chunking and language tagging.

pub mod language;
pub mod segmenter;

pub use language::{DetectionWeights, Language, LanguageDetector, LanguageSegment};
pub use segmenter::{TextChunk, segment, split_paragraphs, split_sentences};
