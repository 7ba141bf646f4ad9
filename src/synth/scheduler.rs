//! Bounded-concurrency synthesis with order-preserving results.
//!
//! The first request is dispatched immediately and never waits for admission.
//! The rest are admitted through a semaphore of `max_concurrency` permits, in
//! input order. Every request owns a one-shot result slot with exactly one
//! writer; results are read back slot by slot, so a fast later chunk never
//! overtakes a slow earlier one. The first failure is recorded as the run's
//! outcome and cancels everything still running, even when earlier chunks
//! have not finished yet.

use crate::audio::wav::AudioContainer;
use crate::defaults;
use crate::error::{PipertrayError, Result};
use crate::synth::backend::SynthesisBackend;
use crate::synth::request::{SynthesisRequest, TimeoutPolicy};
use crate::text::segmenter::TextChunk;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Slot = oneshot::Receiver<Result<AudioContainer>>;

/// First non-cancellation error of a run, shared by its chunk tasks.
#[derive(Clone, Default)]
struct FirstFailure(Arc<Mutex<Option<PipertrayError>>>);

impl FirstFailure {
    /// Record `error` unless an earlier failure is already held.
    fn record(&self, error: PipertrayError) -> bool {
        match self.0.lock() {
            Ok(mut held) if held.is_none() => {
                *held = Some(error);
                true
            }
            _ => false,
        }
    }

    fn take(&self) -> Option<PipertrayError> {
        self.0.lock().ok().and_then(|mut held| held.take())
    }
}

/// Dispatches synthesis requests to a backend under a concurrency cap.
#[derive(Clone)]
pub struct Scheduler {
    backend: Arc<dyn SynthesisBackend>,
    max_concurrency: usize,
    timeouts: TimeoutPolicy,
}

impl Scheduler {
    pub fn new(backend: Arc<dyn SynthesisBackend>) -> Self {
        Self {
            backend,
            max_concurrency: defaults::MAX_CONCURRENCY,
            timeouts: TimeoutPolicy::default(),
        }
    }

    /// Cap on simultaneous calls after the first; values below 1 become 1.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn backend(&self) -> &Arc<dyn SynthesisBackend> {
        &self.backend
    }

    pub fn timeouts(&self) -> TimeoutPolicy {
        self.timeouts
    }

    /// Synthesize one request directly, without any scheduling machinery.
    pub async fn synthesize_one(
        &self,
        request: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> Result<AudioContainer> {
        if cancel.is_cancelled() {
            return Err(PipertrayError::Cancelled);
        }
        let timeout = self.timeouts.timeout_for(&request.text);
        self.backend.synthesize(request, timeout, cancel).await
    }

    /// Synthesize text chunks with a shared voice, returning audio in chunk order.
    pub async fn run_chunks(
        &self,
        chunks: &[TextChunk],
        template: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<AudioContainer>> {
        let requests = chunks.iter().map(|c| template.with_text(&c.text)).collect();
        self.run(requests, cancel).await
    }

    /// Synthesize all requests and return their audio in input order.
    ///
    /// Fails with the first error encountered; completed siblings are
    /// discarded and in-flight calls are cancelled.
    pub async fn run(
        &self,
        requests: Vec<SynthesisRequest>,
        cancel: &CancellationToken,
    ) -> Result<Vec<AudioContainer>> {
        match requests.len() {
            0 => return Ok(Vec::new()),
            1 => return Ok(vec![self.synthesize_one(&requests[0], cancel).await?]),
            _ => {}
        }

        let mut results = self.dispatch(requests, cancel);
        let mut audio = Vec::with_capacity(results.len());
        while let Some(next) = results.next().await {
            let (_, container) = next?;
            audio.push(container);
        }
        Ok(audio)
    }

    /// Start synthesizing every request and hand back their ordered result slots.
    ///
    /// Must be called inside a tokio runtime. Dropping the returned
    /// [`OrderedResults`] cancels whatever is still running.
    pub fn dispatch(
        &self,
        requests: Vec<SynthesisRequest>,
        cancel: &CancellationToken,
    ) -> OrderedResults {
        let run_cancel = cancel.child_token();
        let failure = FirstFailure::default();
        let total = requests.len();
        let mut slots = VecDeque::with_capacity(total);
        let mut jobs = Vec::with_capacity(total);
        for (index, request) in requests.into_iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            slots.push_back(rx);
            jobs.push((index, request, tx));
        }
        let mut jobs = jobs.into_iter();

        // The first chunk bypasses the admission gate.
        if let Some((index, request, slot)) = jobs.next() {
            debug!(index, "dispatching first chunk");
            tokio::spawn(synthesize_into(
                self.backend.clone(),
                self.timeouts,
                index,
                request,
                slot,
                run_cancel.clone(),
                failure.clone(),
                None,
            ));
        }

        let gate = Arc::new(Semaphore::new(self.max_concurrency));
        let backend = self.backend.clone();
        let timeouts = self.timeouts;
        let dispatch_cancel = run_cancel.clone();
        let dispatch_failure = failure.clone();
        let dispatcher = tokio::spawn(async move {
            for (index, request, slot) in jobs {
                let permit = tokio::select! {
                    biased;
                    _ = dispatch_cancel.cancelled() => break,
                    permit = gate.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };
                debug!(index, "dispatching chunk");
                tokio::spawn(synthesize_into(
                    backend.clone(),
                    timeouts,
                    index,
                    request,
                    slot,
                    dispatch_cancel.clone(),
                    dispatch_failure.clone(),
                    Some(permit),
                ));
            }
            // Undispatched slots are dropped here; readers see them as cancelled.
        });

        OrderedResults {
            slots,
            next_index: 0,
            cancel: run_cancel,
            failure,
            dispatcher: Some(dispatcher),
        }
    }
}

async fn synthesize_into(
    backend: Arc<dyn SynthesisBackend>,
    timeouts: TimeoutPolicy,
    index: usize,
    request: SynthesisRequest,
    slot: oneshot::Sender<Result<AudioContainer>>,
    cancel: CancellationToken,
    failure: FirstFailure,
    permit: Option<OwnedSemaphorePermit>,
) {
    let result = if cancel.is_cancelled() {
        Err(PipertrayError::Cancelled)
    } else {
        let timeout = timeouts.timeout_for(&request.text);
        backend.synthesize(&request, timeout, &cancel).await
    };

    let result = match result {
        Err(e) if !e.is_cancelled() => {
            warn!(index, "chunk synthesis failed: {}", e);
            if failure.record(e) {
                debug!(index, "failing run fast");
            }
            cancel.cancel();
            Err(PipertrayError::Cancelled)
        }
        other => other,
    };
    drop(permit);
    if slot.send(result).is_err() {
        debug!(index, "result slot closed before chunk finished");
    }
}

/// Results of a dispatched run, yielded strictly in input order.
pub struct OrderedResults {
    slots: VecDeque<Slot>,
    next_index: usize,
    cancel: CancellationToken,
    failure: FirstFailure,
    dispatcher: Option<JoinHandle<()>>,
}

impl OrderedResults {
    /// Wait for the next result in input order.
    ///
    /// Returns `None` once every result has been yielded or after an error.
    /// A failure of any chunk, including one after the slot being awaited,
    /// is returned as soon as it happens.
    pub async fn next(&mut self) -> Option<Result<(usize, AudioContainer)>> {
        let mut slot = self.slots.pop_front()?;
        let index = self.next_index;
        self.next_index += 1;

        let result = tokio::select! {
            biased;
            result = &mut slot => result.unwrap_or(Err(PipertrayError::Cancelled)),
            _ = self.cancel.cancelled() => Err(PipertrayError::Cancelled),
        };

        match result {
            Ok(container) => Some(Ok((index, container))),
            Err(e) => {
                let e = self.failure.take().unwrap_or(e);
                self.abort();
                Some(Err(e))
            }
        }
    }

    /// Results not yet yielded.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Cancel everything still running and discard pending results.
    pub fn abort(&mut self) {
        self.cancel.cancel();
        self.slots.clear();
    }
}

impl Drop for OrderedResults {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }
    }
}
