//! Streaming playback: play chunk N while later chunks are still synthesizing.
//!
//! A producer task feeds synthesized containers, in input order, into an
//! unbounded queue. A consumer on a blocking thread pops them and plays each
//! one to completion before taking the next. Generation may run ahead of
//! playback; playback is strictly serial.

use crate::audio::sink::{SharedSink, lock_sink};
use crate::audio::wav::AudioContainer;
use crate::defaults;
use crate::error::{PipertrayError, Result};
use crate::pipeline::types::{StreamMessage, StreamState};
use crate::synth::request::SynthesisRequest;
use crate::synth::scheduler::Scheduler;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Starts streaming runs against a scheduler and a playback sink.
pub struct StreamCoordinator {
    scheduler: Scheduler,
    sink: SharedSink,
    poll_interval: Duration,
}

impl StreamCoordinator {
    pub fn new(scheduler: Scheduler, sink: SharedSink) -> Self {
        Self {
            scheduler,
            sink,
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
        }
    }

    /// How often the consumer checks for cancellation while idle or playing.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Start synthesizing and playing `requests`.
    ///
    /// Must be called inside a tokio runtime. Cancelling `cancel` (or calling
    /// [`StreamHandle::stop`]) ends both sides promptly.
    pub fn start(&self, requests: Vec<SynthesisRequest>, cancel: CancellationToken) -> StreamHandle {
        let (tx, rx) = crossbeam_channel::unbounded();
        let state = Arc::new(Mutex::new(StreamState::Generating));
        debug!(chunks = requests.len(), "starting streaming run");

        let producer = tokio::spawn(produce(
            self.scheduler.clone(),
            requests,
            cancel.clone(),
            tx,
            state.clone(),
        ));

        let consumer = {
            let rx = rx.clone();
            let sink = self.sink.clone();
            let cancel = cancel.clone();
            let state = state.clone();
            let poll = self.poll_interval;
            tokio::task::spawn_blocking(move || {
                let result = consume(&rx, &sink, &cancel, poll);
                set_state(
                    &state,
                    match &result {
                        Ok(()) => StreamState::Idle,
                        Err(e) if e.is_cancelled() => StreamState::Cancelled,
                        Err(_) => StreamState::Failed,
                    },
                );
                result
            })
        };

        StreamHandle {
            cancel,
            state,
            queue: rx,
            producer: Some(producer),
            consumer: Some(consumer),
        }
    }
}

/// A running stream.
///
/// Dropping the handle stops the run.
pub struct StreamHandle {
    cancel: CancellationToken,
    state: Arc<Mutex<StreamState>>,
    queue: Receiver<StreamMessage>,
    producer: Option<JoinHandle<()>>,
    consumer: Option<JoinHandle<Result<()>>>,
}

impl StreamHandle {
    pub fn state(&self) -> StreamState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(StreamState::Failed)
    }

    /// Containers synthesized but not yet picked up for playback.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Cancel both sides and release queued audio. Safe to call repeatedly.
    pub fn stop(&self) {
        self.cancel.cancel();
        let drained = self.queue.try_iter().count();
        if drained > 0 {
            debug!(drained, "discarded queued audio");
        }
    }

    /// Wait for playback to finish.
    ///
    /// Returns `Cancelled` if the run was stopped, or the synthesis or
    /// playback error that ended it.
    pub async fn wait(mut self) -> Result<()> {
        let consumer = self.consumer.take();
        let producer = self.producer.take();

        let result = match consumer {
            Some(consumer) => match consumer.await {
                Ok(result) => result,
                Err(e) => Err(PipertrayError::Other(format!("playback task failed: {}", e))),
            },
            None => Ok(()),
        };

        // The consumer only exits early on cancel or failure; make sure the
        // producer stops too before we report back.
        if result.is_err() {
            self.stop();
        }
        if let Some(producer) = producer
            && let Err(e) = producer.await
        {
            warn!("synthesis task failed: {}", e);
        }
        result
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if self.consumer.is_some() {
            self.stop();
        }
    }
}

fn set_state(state: &Mutex<StreamState>, next: StreamState) {
    if let Ok(mut current) = state.lock() {
        *current = next;
    }
}

fn push(tx: &Sender<StreamMessage>, message: StreamMessage) {
    if tx.send(message).is_err() {
        debug!("playback queue closed");
    }
}

async fn produce(
    scheduler: Scheduler,
    requests: Vec<SynthesisRequest>,
    cancel: CancellationToken,
    tx: Sender<StreamMessage>,
    state: Arc<Mutex<StreamState>>,
) {
    if requests.is_empty() {
        set_state(&state, StreamState::Draining);
        push(&tx, StreamMessage::Done);
        return;
    }

    let mut results = scheduler.dispatch(requests, &cancel);
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = results.next() => next,
        };
        match next {
            Some(Ok((index, container))) => {
                debug!(index, bytes = container.len(), "chunk ready for playback");
                push(&tx, StreamMessage::Item(container));
            }
            Some(Err(e)) if e.is_cancelled() => return,
            Some(Err(e)) => {
                push(&tx, StreamMessage::Failed(e));
                return;
            }
            None => {
                set_state(&state, StreamState::Draining);
                push(&tx, StreamMessage::Done);
                return;
            }
        }
    }
}

fn consume(
    rx: &Receiver<StreamMessage>,
    sink: &SharedSink,
    cancel: &CancellationToken,
    poll: Duration,
) -> Result<()> {
    loop {
        if cancel.is_cancelled() {
            return Err(PipertrayError::Cancelled);
        }
        match rx.recv_timeout(poll) {
            Ok(StreamMessage::Item(container)) => {
                if container.is_empty() {
                    debug!("skipping empty chunk");
                    continue;
                }
                play_blocking(sink, &container, cancel, poll)?;
            }
            Ok(StreamMessage::Done) => return Ok(()),
            Ok(StreamMessage::Failed(e)) => return Err(e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(if cancel.is_cancelled() {
                    PipertrayError::Cancelled
                } else {
                    PipertrayError::Other("synthesis ended without finishing the stream".to_string())
                });
            }
        }
    }
}

/// Play one container to completion on the current thread.
///
/// Polls the sink every `poll`; on cancellation the sink is stopped and
/// `Cancelled` is returned.
pub fn play_blocking(
    sink: &SharedSink,
    audio: &AudioContainer,
    cancel: &CancellationToken,
    poll: Duration,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PipertrayError::Cancelled);
    }
    lock_sink(sink)?.start(audio)?;

    loop {
        if cancel.is_cancelled() {
            lock_sink(sink)?.stop()?;
            return Err(PipertrayError::Cancelled);
        }
        if lock_sink(sink)?.is_finished()? {
            return Ok(());
        }
        std::thread::sleep(poll);
    }
}
