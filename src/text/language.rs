//! Heuristic language tagging for multi-voice synthesis.
//!
//! Each sentence is scored against every enabled language by blending two
//! signals: the share of characters from the language's marker set (script
//! range or diacritics) and the share of words found in a short common-word
//! list. This is a best-effort aid to voice selection; it does not try to be a
//! linguistically accurate identifier.

use crate::defaults;
use crate::text::segmenter::split_sentences;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the detector knows marker characters and common words for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "de")]
    German,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "it")]
    Italian,
    #[serde(rename = "pt")]
    Portuguese,
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "zh")]
    Chinese,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::English,
        Language::French,
        Language::German,
        Language::Spanish,
        Language::Italian,
        Language::Portuguese,
        Language::Russian,
        Language::Chinese,
    ];

    /// ISO 639-1 code.
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::French => "fr",
            Language::German => "de",
            Language::Spanish => "es",
            Language::Italian => "it",
            Language::Portuguese => "pt",
            Language::Russian => "ru",
            Language::Chinese => "zh",
        }
    }

    /// Parse an ISO 639-1 code, case-insensitively.
    pub fn from_code(code: &str) -> Option<Language> {
        let code = code.trim().to_ascii_lowercase();
        Language::ALL.into_iter().find(|l| l.code() == code)
    }

    /// True if `c` is characteristic of this language's script or spelling.
    fn is_marker(self, c: char) -> bool {
        let lower = c.to_lowercase().next().unwrap_or(c);
        match self {
            // English has no distinctive characters; it relies on words.
            Language::English => false,
            Language::French => "àâæçéèêëîïôœùûüÿ".contains(lower),
            Language::German => "äöüß".contains(lower),
            Language::Spanish => "ñáéíóú¿¡".contains(lower),
            Language::Italian => "àèéìíîòóù".contains(lower),
            Language::Portuguese => "ãõâêôáéíóúàç".contains(lower),
            Language::Russian => matches!(c, '\u{0400}'..='\u{04FF}'),
            Language::Chinese => matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}'),
        }
    }

    fn common_words(self) -> &'static [&'static str] {
        match self {
            Language::English => &[
                "the", "a", "an", "and", "or", "is", "are", "was", "were", "be", "this", "that",
                "it", "of", "to", "in", "on", "for", "with", "you", "i", "we", "they", "he", "she",
                "have", "has", "not", "what", "hello", "world", "there", "my", "your", "good",
            ],
            Language::French => &[
                "le", "la", "les", "un", "une", "des", "et", "est", "sont", "je", "tu", "il",
                "elle", "nous", "vous", "ils", "de", "du", "que", "qui", "ne", "pas", "pour",
                "dans", "sur", "avec", "ce", "cette", "bonjour", "monde", "merci", "oui", "mais",
            ],
            Language::German => &[
                "der", "die", "das", "und", "ist", "sind", "ich", "du", "er", "sie", "wir", "ihr",
                "nicht", "ein", "eine", "zu", "mit", "auf", "für", "von", "den", "dem", "auch",
                "hallo", "welt", "danke", "ja", "nein", "aber", "wie",
            ],
            Language::Spanish => &[
                "el", "la", "los", "las", "un", "una", "y", "es", "son", "yo", "tú", "él", "ella",
                "nosotros", "que", "de", "del", "en", "por", "para", "con", "no", "sí", "hola",
                "mundo", "gracias", "pero", "como", "muy", "está",
            ],
            Language::Italian => &[
                "il", "lo", "la", "gli", "le", "un", "una", "e", "è", "sono", "io", "tu", "lui",
                "lei", "noi", "voi", "che", "di", "del", "della", "in", "per", "con", "non",
                "ciao", "mondo", "grazie", "ma", "come", "molto",
            ],
            Language::Portuguese => &[
                "o", "a", "os", "as", "um", "uma", "e", "é", "são", "eu", "tu", "ele", "ela",
                "nós", "que", "de", "do", "da", "em", "por", "para", "com", "não", "sim", "olá",
                "mundo", "obrigado", "mas", "como", "muito",
            ],
            Language::Russian => &[
                "и", "в", "не", "на", "я", "он", "она", "мы", "вы", "они", "что", "это", "как",
                "с", "по", "но", "да", "нет", "привет", "мир", "спасибо", "для", "так", "был",
            ],
            Language::Chinese => &[],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Threshold and blend weights for language scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionWeights {
    /// A language is assigned only when its best score exceeds this.
    pub threshold: f64,
    pub char_weight: f64,
    pub word_weight: f64,
}

impl Default for DetectionWeights {
    fn default() -> Self {
        Self {
            threshold: defaults::LANGUAGE_THRESHOLD,
            char_weight: defaults::CHAR_WEIGHT,
            word_weight: defaults::WORD_WEIGHT,
        }
    }
}

/// A run of text with the language assigned to it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSegment {
    pub text: String,
    /// `None` means "use the default voice".
    pub language: Option<Language>,
}

/// Scores sentences against a fixed, ordered set of enabled languages.
#[derive(Debug, Clone)]
pub struct LanguageDetector {
    enabled: Vec<Language>,
    default_language: Option<Language>,
    weights: DetectionWeights,
}

impl LanguageDetector {
    /// Create a detector for the given languages, in priority order for ties.
    pub fn new(enabled: Vec<Language>) -> Self {
        Self {
            enabled,
            default_language: None,
            weights: DetectionWeights::default(),
        }
    }

    /// Set the language that receives plain-ASCII sentences nothing else claimed.
    ///
    /// Only takes effect if the language is also enabled.
    pub fn with_default_language(mut self, language: Option<Language>) -> Self {
        self.default_language = language;
        self
    }

    pub fn with_weights(mut self, weights: DetectionWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn enabled(&self) -> &[Language] {
        &self.enabled
    }

    /// Weighted score of `sentence` for `language`, in `0.0..=1.0`.
    pub fn score(&self, sentence: &str, language: Language) -> f64 {
        self.weights.char_weight * char_score(sentence, language)
            + self.weights.word_weight * word_score(sentence, language)
    }

    /// Best-scoring enabled language for one sentence.
    pub fn detect(&self, sentence: &str) -> Option<Language> {
        let mut best: Option<(Language, f64)> = None;
        for &language in &self.enabled {
            let score = self.score(sentence, language);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((language, score));
            }
        }

        if let Some((language, score)) = best
            && score > self.weights.threshold
        {
            return Some(language);
        }

        match self.default_language {
            Some(default) if self.enabled.contains(&default) && is_plain_latin(sentence) => {
                Some(default)
            }
            _ => None,
        }
    }

    /// Split text into sentences, tag each, and merge neighbours with equal tags.
    pub fn segment(&self, text: &str) -> Vec<LanguageSegment> {
        let mut segments: Vec<LanguageSegment> = Vec::new();

        for sentence in split_sentences(text) {
            let language = self.detect(sentence);
            match segments.last_mut() {
                Some(last) if last.language == language => {
                    last.text.push(' ');
                    last.text.push_str(sentence);
                }
                _ => segments.push(LanguageSegment {
                    text: sentence.to_string(),
                    language,
                }),
            }
        }

        segments
    }
}

fn char_score(sentence: &str, language: Language) -> f64 {
    let letters = sentence.chars().filter(|c| c.is_alphabetic()).count();
    if letters == 0 {
        return 0.0;
    }
    let markers = sentence.chars().filter(|&c| language.is_marker(c)).count();
    (markers as f64 / letters as f64).min(1.0)
}

fn word_score(sentence: &str, language: Language) -> f64 {
    let common = language.common_words();
    let words: Vec<String> = sentence
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphabetic()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let hits = words.iter().filter(|w| common.contains(&w.as_str())).count();
    hits as f64 / words.len() as f64
}

/// ASCII, whitespace and general punctuation only.
fn is_plain_latin(sentence: &str) -> bool {
    sentence
        .chars()
        .all(|c| c.is_ascii() || c.is_whitespace() || matches!(c, '\u{2000}'..='\u{206F}'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn en_fr() -> LanguageDetector {
        LanguageDetector::new(vec![Language::English, Language::French])
    }

    #[test]
    fn test_english_and_french_sentences_are_separated() {
        let segments = en_fr().segment("Hello world. Bonjour le monde.");
        assert_eq!(
            segments,
            vec![
                LanguageSegment {
                    text: "Hello world.".to_string(),
                    language: Some(Language::English),
                },
                LanguageSegment {
                    text: "Bonjour le monde.".to_string(),
                    language: Some(Language::French),
                },
            ]
        );
    }

    #[test]
    fn test_consecutive_same_language_sentences_merge() {
        let segments = en_fr().segment("This is good. You are there. Merci et bonjour.");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "This is good. You are there.");
        assert_eq!(segments[0].language, Some(Language::English));
        assert_eq!(segments[1].language, Some(Language::French));
    }

    #[test]
    fn test_unknown_text_gets_no_language() {
        let detector = en_fr();
        assert_eq!(detector.detect("Xyzzy plugh."), None);
    }

    #[test]
    fn test_plain_ascii_falls_back_to_enabled_default() {
        let detector = en_fr().with_default_language(Some(Language::English));
        assert_eq!(detector.detect("Xyzzy plugh."), Some(Language::English));
    }

    #[test]
    fn test_default_language_must_be_enabled() {
        let detector = LanguageDetector::new(vec![Language::French])
            .with_default_language(Some(Language::English));
        assert_eq!(detector.detect("Xyzzy plugh."), None);
    }

    #[test]
    fn test_non_ascii_text_skips_default_fallback() {
        let detector = LanguageDetector::new(vec![Language::English])
            .with_default_language(Some(Language::English));
        assert_eq!(detector.detect("Привет мир."), None);
    }

    #[test]
    fn test_script_ranges_identify_russian_and_chinese() {
        let detector = LanguageDetector::new(vec![
            Language::English,
            Language::Russian,
            Language::Chinese,
        ]);
        assert_eq!(detector.detect("Привет, как дела?"), Some(Language::Russian));
        assert_eq!(detector.detect("你好世界"), Some(Language::Chinese));
    }

    #[test]
    fn test_diacritics_and_words_identify_german() {
        let detector = LanguageDetector::new(vec![Language::English, Language::German]);
        assert_eq!(
            detector.detect("Ich bin müde und die Straße ist lang."),
            Some(Language::German)
        );
    }

    #[test]
    fn test_score_blends_char_and_word_shares() {
        let detector = en_fr();
        // Every word is a common French word and there are no diacritics.
        let score = detector.score("le monde", Language::French);
        assert!((score - 0.6).abs() < 1e-9, "score = {}", score);
        assert_eq!(detector.score("", Language::French), 0.0);
    }

    #[test]
    fn test_custom_weights_change_threshold_behaviour() {
        let detector = en_fr().with_weights(DetectionWeights {
            threshold: 0.9,
            char_weight: 0.4,
            word_weight: 0.6,
        });
        assert_eq!(detector.detect("Hello world."), None);
    }

    #[test]
    fn test_segments_cover_text_without_gaps() {
        let text = "Hello world. Bonjour le monde. This is it. Le chat est là.";
        let segments = en_fr()
            .with_default_language(Some(Language::English))
            .segment(text);
        let rejoined = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_language_codes_round_trip() {
        for language in Language::ALL {
            assert_eq!(Language::from_code(language.code()), Some(language));
        }
        assert_eq!(Language::from_code(" FR "), Some(Language::French));
        assert_eq!(Language::from_code("xx"), None);
    }
}
