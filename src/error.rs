//! Error types for pipertray.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipertrayError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Synthesis backend errors
    #[error("Synthesis backend not found: {executable}")]
    BackendNotFound { executable: String },

    #[error("Voice model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Synthesis backend failed: {diagnostic}")]
    BackendFailed { diagnostic: String },

    #[error("Synthesis timed out after {after:?}")]
    Timeout { after: Duration },

    // Audio container errors
    #[error("Malformed audio: {message}")]
    MalformedAudio { message: String },

    #[error("Audio format mismatch: expected {expected}, got {actual}")]
    AudioFormatMismatch { expected: String, actual: String },

    // Playback errors
    #[error("Playback failed: {message}")]
    Playback { message: String },

    /// A newer request or an explicit stop superseded the run.
    #[error("Cancelled")]
    Cancelled,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl PipertrayError {
    /// True for silent aborts that must not be reported to the user.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipertrayError::Cancelled)
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, PipertrayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_backend_not_found_display() {
        let error = PipertrayError::BackendNotFound {
            executable: "piper".to_string(),
        };
        assert_eq!(error.to_string(), "Synthesis backend not found: piper");
    }

    #[test]
    fn test_model_not_found_display() {
        let error = PipertrayError::ModelNotFound {
            path: "/voices/en_US-lessac-medium.onnx".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Voice model not found at /voices/en_US-lessac-medium.onnx"
        );
    }

    #[test]
    fn test_backend_failed_display() {
        let error = PipertrayError::BackendFailed {
            diagnostic: "phonemizer crashed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Synthesis backend failed: phonemizer crashed"
        );
    }

    #[test]
    fn test_timeout_display() {
        let error = PipertrayError::Timeout {
            after: Duration::from_millis(3000),
        };
        assert_eq!(error.to_string(), "Synthesis timed out after 3s");
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = PipertrayError::ConfigInvalidValue {
            key: "voice.speed".to_string(),
            message: "must be between 1 and 10".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for voice.speed: must be between 1 and 10"
        );
    }

    #[test]
    fn test_audio_format_mismatch_display() {
        let error = PipertrayError::AudioFormatMismatch {
            expected: "22050Hz mono 16-bit".to_string(),
            actual: "44100Hz stereo 16-bit".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio format mismatch: expected 22050Hz mono 16-bit, got 44100Hz stereo 16-bit"
        );
    }

    #[test]
    fn test_is_cancelled_only_for_cancelled() {
        assert!(PipertrayError::Cancelled.is_cancelled());
        assert!(
            !PipertrayError::Timeout {
                after: Duration::from_secs(1)
            }
            .is_cancelled()
        );
        assert!(!PipertrayError::Other("x".to_string()).is_cancelled());
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let error: PipertrayError = io_error.into();
        assert!(error.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: PipertrayError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: PipertrayError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<PipertrayError>();
        assert_sync::<PipertrayError>();
    }
}
