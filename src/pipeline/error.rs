//! Reporting for pipeline failures that reach the user.

use crate::error::PipertrayError;

/// Receives failures from a pipeline run.
///
/// Cancellation is never reported; only real failures arrive here, once per run.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a pipeline stage (`"speak"`, `"export"`).
    fn report(&self, stage: &str, error: &PipertrayError);
}

/// Reporter that logs failures through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, stage: &str, error: &PipertrayError) {
        tracing::error!(stage, "{}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_reporter() {
        let reporter = LogReporter;
        let error = PipertrayError::BackendFailed {
            diagnostic: "test error".to_string(),
        };
        // Just ensure it doesn't panic
        reporter.report("speak", &error);
    }

    #[test]
    fn test_reporter_is_object_safe() {
        let reporter: Box<dyn ErrorReporter> = Box::new(LogReporter);
        reporter.report("export", &PipertrayError::Other("x".to_string()));
    }
}
