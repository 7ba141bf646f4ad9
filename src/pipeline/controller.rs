//! The pipeline controller: `speak`, `export` and playback control.
//!
//! At most one `speak` run is active at a time. Starting a new one cancels the
//! previous run and waits for it to wind down before the new run begins;
//! the swap happens under a single lock, so two requests arriving together
//! are serialized rather than both believing they own the active run.

use crate::audio::sink::{SharedSink, lock_sink};
use crate::audio::wav::{self, AudioContainer};
use crate::defaults;
use crate::error::{PipertrayError, Result};
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::stream::{StreamCoordinator, play_blocking};
use crate::pipeline::types::SpeakOutcome;
use crate::synth::backend::SynthesisBackend;
use crate::synth::request::{SynthesisRequest, TimeoutPolicy, VoiceProfile};
use crate::synth::scheduler::Scheduler;
use crate::text::language::{Language, LanguageDetector};
use crate::text::segmenter::segment;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Per-language voices plus the detector that picks between them.
#[derive(Debug, Clone)]
pub struct VoiceRouting {
    detector: LanguageDetector,
    voices: Vec<(Language, VoiceProfile)>,
}

impl VoiceRouting {
    /// Route sentences detected as `language` to its voice.
    ///
    /// Returns `None` when no voices are given, since there is nothing to route.
    pub fn new(detector: LanguageDetector, voices: Vec<(Language, VoiceProfile)>) -> Option<Self> {
        if voices.is_empty() {
            return None;
        }
        Some(Self { detector, voices })
    }

    pub fn detector(&self) -> &LanguageDetector {
        &self.detector
    }

    /// Voice for a detected language, or `default` when none is configured.
    pub fn voice_for<'a>(
        &'a self,
        language: Option<Language>,
        default: &'a VoiceProfile,
    ) -> &'a VoiceProfile {
        language
            .and_then(|lang| self.voices.iter().find(|(l, _)| *l == lang))
            .map(|(_, voice)| voice)
            .unwrap_or(default)
    }
}

/// Tunables for a controller.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub voice: VoiceProfile,
    pub max_chunk_len: usize,
    pub max_concurrency: usize,
    pub timeouts: TimeoutPolicy,
    pub poll_interval: Duration,
    pub routing: Option<VoiceRouting>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            voice: VoiceProfile::default(),
            max_chunk_len: defaults::MAX_CHUNK_LEN,
            max_concurrency: defaults::MAX_CONCURRENCY,
            timeouts: TimeoutPolicy::default(),
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            routing: None,
        }
    }
}

struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
    finished: oneshot::Receiver<()>,
}

/// Owned by a running `speak` call. Dropping it marks the run as finished.
struct RunTicket {
    id: u64,
    cancel: CancellationToken,
    finished: Option<oneshot::Sender<()>>,
    speaking: Arc<AtomicU64>,
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        // A dropped speak future must not leave playback running.
        self.cancel.cancel();
        if self
            .speaking
            .compare_exchange(self.id, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(run = self.id, "a newer run owns the speaking flag");
        }
        if let Some(finished) = self.finished.take()
            && finished.send(()).is_err()
        {
            debug!(run = self.id, "nobody waiting for run to finish");
        }
    }
}

/// Drives synthesis and playback for callers.
pub struct PipelineController {
    scheduler: Scheduler,
    sink: SharedSink,
    settings: PipelineSettings,
    reporter: Arc<dyn ErrorReporter>,
    active: Mutex<Option<ActiveRun>>,
    next_run: AtomicU64,
    speaking: Arc<AtomicU64>,
}

impl PipelineController {
    pub fn new(
        backend: Arc<dyn SynthesisBackend>,
        sink: SharedSink,
        settings: PipelineSettings,
    ) -> Self {
        let scheduler = Scheduler::new(backend)
            .with_max_concurrency(settings.max_concurrency)
            .with_timeouts(settings.timeouts);
        Self {
            scheduler,
            sink,
            settings,
            reporter: Arc::new(LogReporter),
            active: Mutex::new(None),
            next_run: AtomicU64::new(0),
            speaking: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Requests that `text` turns into, in playback order.
    ///
    /// With voice routing, each chunk is further split by detected language
    /// and every piece gets its language's voice.
    pub fn plan(&self, text: &str, voice: &VoiceProfile) -> Vec<SynthesisRequest> {
        let chunks = segment(text, self.settings.max_chunk_len);
        match &self.settings.routing {
            None => chunks
                .iter()
                .map(|chunk| SynthesisRequest::for_voice(chunk.text.as_str(), voice))
                .collect(),
            Some(routing) => chunks
                .iter()
                .flat_map(|chunk| routing.detector().segment(&chunk.text))
                .map(|piece| {
                    let voice = routing.voice_for(piece.language, voice);
                    SynthesisRequest::for_voice(piece.text, voice)
                })
                .collect(),
        }
    }

    /// Speak `text` with the configured voice.
    pub async fn speak(&self, text: &str) -> Result<SpeakOutcome> {
        self.speak_with(text, &self.settings.voice).await
    }

    /// Speak `text`, replacing any run still in progress.
    ///
    /// Returns `SpeakOutcome::Cancelled` when a newer request or [`stop`]
    /// interrupted this one. Failures are reported once and returned.
    ///
    /// [`stop`]: PipelineController::stop
    pub async fn speak_with(&self, text: &str, voice: &VoiceProfile) -> Result<SpeakOutcome> {
        let ticket = self.begin_run().await;
        let run = ticket.id;
        info!(run, chars = text.chars().count(), "speaking");

        let result = self.speak_run(text, voice, &ticket.cancel).await;
        drop(ticket);
        self.end_run(run).await;

        match result {
            Ok(()) => Ok(SpeakOutcome::Completed),
            Err(e) if e.is_cancelled() => {
                debug!(run, "speech cancelled");
                Ok(SpeakOutcome::Cancelled)
            }
            Err(e) => {
                self.reporter.report("speak", &e);
                Err(e)
            }
        }
    }

    async fn speak_run(
        &self,
        text: &str,
        voice: &VoiceProfile,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let requests = self.plan(text, voice);
        match requests.as_slice() {
            [] => Ok(()),
            [request] => {
                let audio = self.scheduler.synthesize_one(request, cancel).await?;
                self.play(audio, cancel).await
            }
            _ => {
                StreamCoordinator::new(self.scheduler.clone(), self.sink.clone())
                    .with_poll_interval(self.settings.poll_interval)
                    .start(requests, cancel.clone())
                    .wait()
                    .await
            }
        }
    }

    async fn play(&self, audio: AudioContainer, cancel: &CancellationToken) -> Result<()> {
        if audio.is_empty() {
            return Ok(());
        }
        let sink = self.sink.clone();
        let cancel = cancel.clone();
        let poll = self.settings.poll_interval;
        tokio::task::spawn_blocking(move || play_blocking(&sink, &audio, &cancel, poll))
            .await
            .map_err(|e| PipertrayError::Other(format!("playback task failed: {}", e)))?
    }

    /// Synthesize `text` with the configured voice into one container.
    pub async fn export(&self, text: &str) -> Result<AudioContainer> {
        self.export_with(text, &self.settings.voice).await
    }

    /// Synthesize every chunk, then join them in order.
    ///
    /// Never returns partial audio: any chunk failure fails the export.
    /// Independent of the active `speak` run.
    pub async fn export_with(&self, text: &str, voice: &VoiceProfile) -> Result<AudioContainer> {
        let requests = self.plan(text, voice);
        info!(chunks = requests.len(), "exporting");

        let cancel = CancellationToken::new();
        let result = match self.scheduler.run(requests, &cancel).await {
            Ok(containers) => wav::concat(&containers),
            Err(e) => Err(e),
        };
        if let Err(e) = &result
            && !e.is_cancelled()
        {
            self.reporter.report("export", e);
        }
        result
    }

    async fn begin_run(&self) -> RunTicket {
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            debug!(run = previous.id, "cancelling previous run");
            previous.cancel.cancel();
            if previous.finished.await.is_err() {
                debug!(run = previous.id, "previous run ended without signalling");
            }
        }

        let id = self.next_run.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let (finished_tx, finished_rx) = oneshot::channel();
        *active = Some(ActiveRun {
            id,
            cancel: cancel.clone(),
            finished: finished_rx,
        });
        self.speaking.store(id, Ordering::SeqCst);

        RunTicket {
            id,
            cancel,
            finished: Some(finished_tx),
            speaking: self.speaking.clone(),
        }
    }

    async fn end_run(&self, id: u64) {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|run| run.id == id) {
            *active = None;
        }
    }

    /// Cancel the active run, if any, and silence the sink.
    pub async fn stop(&self) -> Result<()> {
        if let Some(run) = self.active.lock().await.as_ref() {
            debug!(run = run.id, "stop requested");
            run.cancel.cancel();
        }
        lock_sink(&self.sink)?.stop()
    }

    /// True while a `speak` run is in progress.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst) != 0
    }

    pub fn pause(&self) -> Result<()> {
        lock_sink(&self.sink)?.pause()
    }

    pub fn resume(&self) -> Result<()> {
        lock_sink(&self.sink)?.resume()
    }

    /// Move the playhead of the current chunk by `offset_ms`.
    pub fn seek(&self, offset_ms: i64) -> Result<()> {
        lock_sink(&self.sink)?.seek(offset_ms)
    }

    /// Playhead position within the chunk currently playing.
    pub fn position(&self) -> Result<Duration> {
        Ok(lock_sink(&self.sink)?.position())
    }

    /// Length of the chunk currently playing.
    pub fn duration(&self) -> Result<Duration> {
        Ok(lock_sink(&self.sink)?.duration())
    }
}
