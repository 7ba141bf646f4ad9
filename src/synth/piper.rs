//! Synthesis through one piper process per request.
//!
//! Each call spawns the backend, writes the text to its stdin, collects raw
//! PCM from stdout and stderr diagnostics, and reaps the process on every exit
//! path. On timeout or cancellation the process is asked to terminate, given a
//! short grace period, then killed.

use crate::audio::wav::AudioContainer;
use crate::defaults;
use crate::error::{PipertrayError, Result};
use crate::synth::backend::SynthesisBackend;
use crate::synth::request::SynthesisRequest;
use crate::sys::{self, Signal};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for the piper backend.
#[derive(Debug, Clone)]
pub struct PiperConfig {
    /// Executable name or path.
    pub executable: PathBuf,
    /// Arguments placed before the generated ones.
    pub extra_args: Vec<String>,
    /// Time allowed between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
}

impl Default for PiperConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(defaults::BACKEND_EXECUTABLE),
            extra_args: Vec::new(),
            kill_grace: Duration::from_millis(defaults::KILL_GRACE_MS),
        }
    }
}

/// Production backend that runs the piper binary.
#[derive(Debug, Clone)]
pub struct PiperBackend {
    config: PiperConfig,
    name: String,
}

impl PiperBackend {
    pub fn new(config: PiperConfig) -> Self {
        let name = config.executable.display().to_string();
        Self { config, name }
    }

    /// Arguments for one request, after `extra_args`.
    pub fn arguments(&self, request: &SynthesisRequest) -> Vec<String> {
        let mut args = self.config.extra_args.clone();
        args.push("--model".to_string());
        args.push(request.voice_model.display().to_string());
        args.push("--output-raw".to_string());
        args.push("--length_scale".to_string());
        args.push(request.pacing_arg());
        if request.speaker_id > 0 {
            args.push("--speaker".to_string());
            args.push(request.speaker_id.to_string());
        }
        args
    }

    fn spawn(&self, request: &SynthesisRequest) -> Result<Child> {
        Command::new(&self.config.executable)
            .args(self.arguments(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PipertrayError::BackendNotFound {
                        executable: self.name.clone(),
                    }
                } else {
                    PipertrayError::Io(e)
                }
            })
    }

    /// Ask the process to exit, then force it, and always reap it.
    async fn terminate(&self, child: &mut Child) {
        if let Some(pid) = child.id()
            && request_exit(&self.name, pid)
            && tokio::time::timeout(self.config.kill_grace, child.wait())
                .await
                .is_ok()
        {
            return;
        }

        if let Err(e) = child.start_kill() {
            debug!("start_kill on {} failed: {}", self.name, e);
        }
        if let Err(e) = child.wait().await {
            warn!("failed to reap {}: {}", self.name, e);
        }
    }
}

impl Default for PiperBackend {
    fn default() -> Self {
        Self::new(PiperConfig::default())
    }
}

fn request_exit(name: &str, pid: u32) -> bool {
    match sys::send_signal(pid, Signal::Terminate) {
        Ok(()) => true,
        Err(e) => {
            debug!("SIGTERM to {} failed: {}", name, e);
            false
        }
    }
}

enum Outcome {
    Finished(std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)>),
    TimedOut,
    Cancelled,
}

/// Feed stdin, drain stdout/stderr concurrently, then wait for exit.
async fn exchange(
    child: &mut Child,
    mut stdin: ChildStdin,
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    text: &str,
) -> std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let write = async move {
        let result = stdin.write_all(text.as_bytes()).await;
        // Dropping stdin closes the pipe so the backend sees EOF.
        drop(stdin);
        match result {
            // The backend may exit without reading everything; its exit
            // status tells the real story.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    };
    let mut out = Vec::new();
    let mut err = Vec::new();
    let (written, read_out, read_err) = tokio::join!(
        write,
        stdout.read_to_end(&mut out),
        stderr.read_to_end(&mut err)
    );
    written?;
    read_out?;
    read_err?;

    let status = child.wait().await?;
    Ok((status, out, err))
}

#[async_trait]
impl SynthesisBackend for PiperBackend {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<AudioContainer> {
        if !request.voice_model.is_file() {
            return Err(PipertrayError::ModelNotFound {
                path: request.voice_model.display().to_string(),
            });
        }
        if cancel.is_cancelled() {
            return Err(PipertrayError::Cancelled);
        }

        let mut child = self.spawn(request)?;
        debug!(
            pid = ?child.id(),
            chars = request.text.chars().count(),
            "spawned {}",
            self.name
        );

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            self.terminate(&mut child).await;
            return Err(PipertrayError::Other(format!(
                "{} was spawned without piped stdio",
                self.name
            )));
        };

        let outcome = {
            let exchange = exchange(&mut child, stdin, stdout, stderr, &request.text);
            tokio::select! {
                result = exchange => Outcome::Finished(result),
                _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
                _ = cancel.cancelled() => Outcome::Cancelled,
            }
        };

        let (status, out, err) = match outcome {
            Outcome::Finished(Ok(finished)) => finished,
            Outcome::Finished(Err(e)) => {
                self.terminate(&mut child).await;
                return Err(PipertrayError::Io(e));
            }
            Outcome::TimedOut => {
                warn!("{} produced no result within {:?}", self.name, timeout);
                self.terminate(&mut child).await;
                return Err(PipertrayError::Timeout { after: timeout });
            }
            Outcome::Cancelled => {
                debug!("cancelling {}", self.name);
                self.terminate(&mut child).await;
                return Err(PipertrayError::Cancelled);
            }
        };

        if !status.success() {
            let diagnostic = String::from_utf8_lossy(&err).trim().to_string();
            return Err(PipertrayError::BackendFailed {
                diagnostic: if diagnostic.is_empty() {
                    format!("{} exited with {}", self.name, status)
                } else {
                    diagnostic
                },
            });
        }

        debug!(bytes = out.len(), "{} finished", self.name);
        AudioContainer::from_pcm(&out)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::request::VoiceProfile;

    fn request(speed: u8, speaker_id: u32) -> SynthesisRequest {
        SynthesisRequest::for_voice(
            "Hello.",
            &VoiceProfile {
                model: PathBuf::from("/voices/en.onnx"),
                speaker_id,
                speed,
            },
        )
    }

    #[test]
    fn test_arguments_carry_model_and_pacing() {
        let backend = PiperBackend::default();
        assert_eq!(
            backend.arguments(&request(5, 0)),
            vec![
                "--model",
                "/voices/en.onnx",
                "--output-raw",
                "--length_scale",
                "1.06"
            ]
        );
    }

    #[test]
    fn test_arguments_include_speaker_when_set() {
        let backend = PiperBackend::new(PiperConfig {
            extra_args: vec!["--quiet".to_string()],
            ..PiperConfig::default()
        });
        let args = backend.arguments(&request(10, 4));
        assert_eq!(args.first().map(String::as_str), Some("--quiet"));
        assert!(args.ends_with(&["--speaker".to_string(), "4".to_string()]));
        assert!(args.contains(&"0.50".to_string()));
    }

    #[tokio::test]
    async fn test_missing_model_is_reported_before_spawning() {
        let backend = PiperBackend::default();
        let result = backend
            .synthesize(
                &request(5, 0),
                Duration::from_secs(1),
                &CancellationToken::new(),
            )
            .await;
        match result {
            Err(PipertrayError::ModelNotFound { path }) => assert_eq!(path, "/voices/en.onnx"),
            other => panic!("Expected ModelNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_name_is_executable() {
        let backend = PiperBackend::new(PiperConfig {
            executable: PathBuf::from("/opt/piper/piper"),
            ..PiperConfig::default()
        });
        assert_eq!(backend.name(), "/opt/piper/piper");
    }

    #[test]
    fn test_default_backend_names_piper() {
        let backend = PiperBackend::default();
        assert_eq!(backend.name(), defaults::BACKEND_EXECUTABLE);
        assert_eq!(backend.name(), "piper");
    }
}
