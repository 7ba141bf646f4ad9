//! Synthesis request types and the speed → pacing mapping.

use crate::defaults;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// A voice: model file, speaker within the model and speaking speed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceProfile {
    pub model: PathBuf,
    pub speaker_id: u32,
    /// 1 (slowest) to 10 (fastest).
    pub speed: u8,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            model: PathBuf::new(),
            speaker_id: 0,
            speed: defaults::DEFAULT_SPEED,
        }
    }
}

/// Everything one backend call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub speed: u8,
    pub voice_model: PathBuf,
    pub speaker_id: u32,
}

impl SynthesisRequest {
    pub fn for_voice(text: impl Into<String>, voice: &VoiceProfile) -> Self {
        Self {
            text: text.into(),
            speed: voice.speed,
            voice_model: voice.model.clone(),
            speaker_id: voice.speaker_id,
        }
    }

    /// Same voice settings, different text.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }

    pub fn pacing(&self) -> f64 {
        pacing_for_speed(self.speed)
    }

    /// Pacing as the backend expects it: two decimals, `.` separator.
    pub fn pacing_arg(&self) -> String {
        format!("{:.2}", self.pacing())
    }
}

/// Map speed 1..=10 to piper's length scale (1.50 slowest, 0.50 fastest).
///
/// Out-of-range speeds are clamped. The result is rounded to two decimals.
pub fn pacing_for_speed(speed: u8) -> f64 {
    let speed = speed.clamp(1, 10);
    let raw = 1.5 - f64::from(speed - 1) / 9.0;
    (raw * 100.0).round() / 100.0
}

/// Per-call timeout proportional to text length, with a floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub floor: Duration,
    pub per_char: Duration,
}

impl TimeoutPolicy {
    pub fn timeout_for(&self, text: &str) -> Duration {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        self.floor.max(self.per_char.saturating_mul(chars))
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            floor: Duration::from_millis(defaults::TIMEOUT_FLOOR_MS),
            per_char: Duration::from_millis(defaults::TIMEOUT_PER_CHAR_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_endpoints_and_midpoint() {
        assert_eq!(pacing_for_speed(1), 1.50);
        assert_eq!(pacing_for_speed(10), 0.50);
        assert_eq!(pacing_for_speed(5), 1.06);
    }

    #[test]
    fn test_pacing_is_non_increasing_over_range() {
        let values: Vec<f64> = (1..=10).map(pacing_for_speed).collect();
        for pair in values.windows(2) {
            assert!(pair[1] <= pair[0], "{:?}", values);
        }
        assert!(values.iter().all(|v| (0.5..=1.5).contains(v)));
    }

    #[test]
    fn test_pacing_clamps_out_of_range_speed() {
        assert_eq!(pacing_for_speed(0), 1.50);
        assert_eq!(pacing_for_speed(42), 0.50);
    }

    #[test]
    fn test_pacing_arg_has_two_decimals() {
        let voice = VoiceProfile {
            speed: 1,
            ..VoiceProfile::default()
        };
        assert_eq!(SynthesisRequest::for_voice("x", &voice).pacing_arg(), "1.50");
        let voice = VoiceProfile {
            speed: 5,
            ..VoiceProfile::default()
        };
        assert_eq!(SynthesisRequest::for_voice("x", &voice).pacing_arg(), "1.06");
    }

    #[test]
    fn test_with_text_keeps_voice() {
        let voice = VoiceProfile {
            model: PathBuf::from("/voices/fr.onnx"),
            speaker_id: 3,
            speed: 7,
        };
        let template = SynthesisRequest::for_voice("", &voice);
        let request = template.with_text("Bonjour.");
        assert_eq!(request.text, "Bonjour.");
        assert_eq!(request.voice_model, PathBuf::from("/voices/fr.onnx"));
        assert_eq!(request.speaker_id, 3);
        assert_eq!(request.speed, 7);
    }

    #[test]
    fn test_timeout_has_floor_and_scales() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.timeout_for("short"), Duration::from_millis(3000));
        let long = "a".repeat(1000);
        assert_eq!(policy.timeout_for(&long), Duration::from_millis(15000));
    }

    #[test]
    fn test_timeout_counts_characters_not_bytes() {
        let policy = TimeoutPolicy {
            floor: Duration::ZERO,
            per_char: Duration::from_millis(10),
        };
        assert_eq!(policy.timeout_for("äöü"), Duration::from_millis(30));
    }
}
