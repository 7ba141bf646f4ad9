use crate::audio::wav::AudioContainer;
use crate::error::{PipertrayError, Result};
use crate::synth::request::SynthesisRequest;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for text-to-speech synthesis.
///
/// This trait allows swapping implementations (real piper process vs mock).
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize one request into a WAV container.
    ///
    /// # Arguments
    /// * `request` - Text and voice parameters
    /// * `timeout` - Give up (and clean up) after this long
    /// * `cancel` - Abort promptly once cancelled, returning `Cancelled`
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<AudioContainer>;

    /// Name for logging/debugging.
    fn name(&self) -> &str;
}

/// Implement SynthesisBackend for Arc<T> to allow sharing across runs.
#[async_trait]
impl<T: SynthesisBackend + ?Sized> SynthesisBackend for Arc<T> {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<AudioContainer> {
        (**self).synthesize(request, timeout, cancel).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

type DelayFn = dyn Fn(&SynthesisRequest) -> Duration + Send + Sync;

/// Mock backend for testing.
///
/// Returns the request text's bytes (zero-padded to whole samples) as audio,
/// so tests can tell which request produced which container. Tracks how many
/// calls are in flight, which doubles as a leaked-process spy.
#[derive(Clone)]
pub struct MockBackend {
    delay: Arc<DelayFn>,
    fail_on: Option<String>,
    calls: Arc<Mutex<Vec<SynthesisRequest>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Create a mock that answers immediately.
    pub fn new() -> Self {
        Self {
            delay: Arc::new(|_| Duration::ZERO),
            fail_on: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Use the same delay for every request.
    pub fn with_fixed_delay(self, delay: Duration) -> Self {
        self.with_delay(move |_| delay)
    }

    /// Compute each request's delay from the request.
    pub fn with_delay(
        mut self,
        delay: impl Fn(&SynthesisRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Arc::new(delay);
        self
    }

    /// Fail with `BackendFailed` for any request whose text contains `needle`.
    pub fn with_failure_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// The sample bytes this mock produces for `text`.
    pub fn samples_for(text: &str) -> Vec<u8> {
        let mut bytes = text.as_bytes().to_vec();
        if bytes.len() % 2 == 1 {
            bytes.push(0);
        }
        bytes
    }

    /// Requests received so far, in the order calls started.
    pub fn calls(&self) -> Vec<SynthesisRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Calls currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Calls that ended because of cancellation.
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SynthesisBackend for MockBackend {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<AudioContainer> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = (self.delay)(request);
        tokio::select! {
            _ = cancel.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                return Err(PipertrayError::Cancelled);
            }
            _ = tokio::time::sleep(delay.min(timeout)) => {}
        }
        if delay > timeout {
            return Err(PipertrayError::Timeout { after: timeout });
        }

        if let Some(needle) = &self.fail_on
            && request.text.contains(needle.as_str())
        {
            return Err(PipertrayError::BackendFailed {
                diagnostic: "mock synthesis failure".to_string(),
            });
        }

        AudioContainer::from_pcm(&Self::samples_for(&request.text))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::request::VoiceProfile;

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest::for_voice(text, &VoiceProfile::default())
    }

    #[tokio::test]
    async fn test_mock_returns_text_bytes_as_samples() {
        let backend = MockBackend::new();
        let audio = backend
            .synthesize(&request("abc"), Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(audio.samples(), b"abc\0");
        assert_eq!(backend.call_count(), 1);
        assert_eq!(backend.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_mock_fails_on_needle() {
        let backend = MockBackend::new().with_failure_on("boom");
        let result = backend
            .synthesize(&request("a boom b"), Duration::from_secs(1), &CancellationToken::new())
            .await;
        match result {
            Err(PipertrayError::BackendFailed { diagnostic }) => {
                assert_eq!(diagnostic, "mock synthesis failure");
            }
            other => panic!("Expected BackendFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_times_out() {
        let backend = MockBackend::new().with_fixed_delay(Duration::from_millis(200));
        let result = backend
            .synthesize(&request("x"), Duration::from_millis(10), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PipertrayError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_mock_observes_cancellation() {
        let backend = MockBackend::new().with_fixed_delay(Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = backend
            .synthesize(&request("x"), Duration::from_secs(30), &cancel)
            .await;
        assert!(matches!(result, Err(PipertrayError::Cancelled)));
        assert_eq!(backend.cancelled_count(), 1);
        assert_eq!(backend.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_backend_trait_is_object_safe() {
        let backend: Arc<dyn SynthesisBackend> = Arc::new(MockBackend::new());
        assert_eq!(backend.name(), "mock");
        let audio = backend
            .synthesize(&request("hi"), Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(audio.samples(), b"hi");
    }
}
