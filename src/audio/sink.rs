//! Playback sinks: where finished audio containers end up.

use crate::audio::wav::AudioContainer;
use crate::defaults;
use crate::error::{PipertrayError, Result};
use crate::sys::{self, Signal};
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Pluggable audio output.
///
/// `start` must not block for the length of the audio; the pipeline polls
/// `is_finished` so it can stop playback promptly on cancellation.
pub trait PlaybackSink: Send + 'static {
    /// Begin playing one complete container, replacing anything still playing.
    fn start(&mut self, audio: &AudioContainer) -> Result<()>;

    /// True once the current container has played out, or if nothing is playing.
    fn is_finished(&mut self) -> Result<bool>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Stop immediately. Safe to call when idle.
    fn stop(&mut self) -> Result<()>;

    /// Move the playhead by `offset_ms` (negative seeks backwards).
    fn seek(&mut self, _offset_ms: i64) -> Result<()> {
        Err(PipertrayError::Playback {
            message: format!("{} does not support seeking", self.name()),
        })
    }

    /// Playhead position within the current container.
    fn position(&self) -> Duration;

    /// Length of the current container, zero when idle.
    fn duration(&self) -> Duration;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// A sink shared between the playback consumer and the controller.
pub type SharedSink = Arc<Mutex<Box<dyn PlaybackSink>>>;

/// Box a sink for sharing.
pub fn shared(sink: impl PlaybackSink) -> SharedSink {
    Arc::new(Mutex::new(Box::new(sink)))
}

/// Lock a shared sink, turning poisoning into a playback error.
pub fn lock_sink(sink: &SharedSink) -> Result<std::sync::MutexGuard<'_, Box<dyn PlaybackSink>>> {
    sink.lock().map_err(|_| PipertrayError::Playback {
        message: "playback sink lock poisoned".to_string(),
    })
}

struct Playing {
    child: Child,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    started: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
    duration: Duration,
}

impl Playing {
    fn elapsed(&self) -> Duration {
        let now = self.paused_at.unwrap_or_else(Instant::now);
        now.duration_since(self.started)
            .saturating_sub(self.paused_total)
            .min(self.duration)
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        Ok(sys::send_signal(self.child.id(), signal)?)
    }
}

/// Plays containers by piping them into an external player (`aplay -q -`).
///
/// Pause and resume suspend the player process (unix only).
pub struct CommandSink {
    command: String,
    args: Vec<String>,
    current: Option<Playing>,
}

impl CommandSink {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            current: None,
        }
    }

    fn reap(&mut self) -> Result<()> {
        let Some(mut playing) = self.current.take() else {
            return Ok(());
        };
        if playing.paused_at.is_some()
            && let Err(e) = playing.signal(Signal::Continue)
        {
            tracing::warn!("failed to resume {} before stopping: {}", self.command, e);
        }
        if let Err(e) = playing.child.kill()
            && e.kind() != std::io::ErrorKind::InvalidInput
        {
            tracing::warn!("failed to kill {}: {}", self.command, e);
        }
        playing.child.wait()?;
        if let Some(writer) = playing.writer.take() {
            // The player is gone; a broken pipe here is expected.
            if writer.join().is_err() {
                tracing::warn!("{} stdin writer panicked", self.command);
            }
        }
        Ok(())
    }
}

impl Default for CommandSink {
    fn default() -> Self {
        Self::new(
            defaults::PLAYBACK_COMMAND,
            vec!["-q".to_string(), "-".to_string()],
        )
    }
}

impl PlaybackSink for CommandSink {
    fn start(&mut self, audio: &AudioContainer) -> Result<()> {
        self.reap()?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PipertrayError::Playback {
                        message: format!("player not found: {}", self.command),
                    }
                } else {
                    PipertrayError::Playback {
                        message: format!("failed to start {}: {}", self.command, e),
                    }
                }
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| PipertrayError::Playback {
            message: format!("{} has no stdin", self.command),
        })?;
        let bytes = audio.as_bytes().to_vec();
        let writer = thread::spawn(move || {
            stdin.write_all(&bytes)?;
            stdin.flush()
        });

        self.current = Some(Playing {
            child,
            writer: Some(writer),
            started: Instant::now(),
            paused_at: None,
            paused_total: Duration::ZERO,
            duration: audio.duration(),
        });
        Ok(())
    }

    fn is_finished(&mut self) -> Result<bool> {
        let Some(playing) = self.current.as_mut() else {
            return Ok(true);
        };
        let Some(status) = playing.child.try_wait()? else {
            return Ok(false);
        };

        if let Some(writer) = playing.writer.take() {
            match writer.join() {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    tracing::warn!("writing audio to {} failed: {}", self.command, e);
                }
                Err(_) => tracing::warn!("{} stdin writer panicked", self.command),
                _ => {}
            }
        }
        self.current = None;

        if status.success() {
            Ok(true)
        } else {
            Err(PipertrayError::Playback {
                message: format!("{} exited with {}", self.command, status),
            })
        }
    }

    fn pause(&mut self) -> Result<()> {
        if let Some(playing) = self.current.as_mut()
            && playing.paused_at.is_none()
        {
            playing.signal(Signal::Stop)?;
            playing.paused_at = Some(Instant::now());
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if let Some(playing) = self.current.as_mut()
            && let Some(paused_at) = playing.paused_at
        {
            playing.signal(Signal::Continue)?;
            playing.paused_total += paused_at.elapsed();
            playing.paused_at = None;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.reap()
    }

    fn position(&self) -> Duration {
        self.current
            .as_ref()
            .map(Playing::elapsed)
            .unwrap_or(Duration::ZERO)
    }

    fn duration(&self) -> Duration {
        self.current
            .as_ref()
            .map(|p| p.duration)
            .unwrap_or(Duration::ZERO)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

impl Drop for CommandSink {
    fn drop(&mut self) {
        if let Err(e) = self.reap() {
            tracing::warn!("failed to stop player on drop: {}", e);
        }
    }
}

/// In-memory sink that records everything it is asked to play.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// pipeline owns another. Each container "plays" for `play_time`.
#[derive(Clone, Default)]
pub struct CollectorSink {
    played: Arc<Mutex<Vec<AudioContainer>>>,
    stops: Arc<AtomicUsize>,
    play_time: Duration,
    started: Option<Instant>,
    paused: bool,
    offset_ms: i64,
    current_duration: Duration,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make each container take `play_time` to finish.
    pub fn with_play_time(mut self, play_time: Duration) -> Self {
        self.play_time = play_time;
        self
    }

    /// Containers started so far, in order.
    pub fn played(&self) -> Vec<AudioContainer> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn play_count(&self) -> usize {
        self.played.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Number of explicit `stop` calls.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl PlaybackSink for CollectorSink {
    fn start(&mut self, audio: &AudioContainer) -> Result<()> {
        self.played
            .lock()
            .map_err(|_| PipertrayError::Playback {
                message: "collector lock poisoned".to_string(),
            })?
            .push(audio.clone());
        self.started = Some(Instant::now());
        self.paused = false;
        self.offset_ms = 0;
        self.current_duration = audio.duration();
        Ok(())
    }

    fn is_finished(&mut self) -> Result<bool> {
        let Some(started) = self.started else {
            return Ok(true);
        };
        if self.paused || started.elapsed() < self.play_time {
            return Ok(false);
        }
        self.started = None;
        Ok(true)
    }

    fn pause(&mut self) -> Result<()> {
        self.paused = self.started.is_some();
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.paused = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.started = None;
        self.paused = false;
        Ok(())
    }

    fn seek(&mut self, offset_ms: i64) -> Result<()> {
        self.offset_ms = self.offset_ms.saturating_add(offset_ms).max(0);
        Ok(())
    }

    fn position(&self) -> Duration {
        Duration::from_millis(self.offset_ms.max(0) as u64).min(self.current_duration)
    }

    fn duration(&self) -> Duration {
        self.current_duration
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
