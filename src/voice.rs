//! Voice input.
//!
//! A [`Recognizer`] turns speech into transcript fragments; [`VoiceCapture`]
//! owns the session lifecycle (`idle -> listening -> result | error -> idle`)
//! and decides what reaches the text box. Only the final fragment is ever
//! written; sending stays a separate action.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ChatError, Result};
use crate::input::CaptureEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEventKind {
    Interim(String),
    Final(String),
    Error(String),
    /// Recognizer stopped without a final fragment
    Ended,
}

/// Recognizer output tagged with the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceEvent {
    pub session: u64,
    pub kind: VoiceEventKind,
}

/// Speech engine seam
pub trait Recognizer: Send {
    /// Begin a session. Events go to `tx` tagged with `session`.
    fn start(&mut self, session: u64, tx: mpsc::UnboundedSender<CaptureEvent>) -> Result<()>;
    /// End the running session, if any. Must be safe to call twice.
    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Listening,
}

/// What the app should do after a recognizer event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceOutcome {
    /// Stale or irrelevant, nothing to do
    Ignored,
    /// Partial transcript, display-only
    Interim(String),
    /// Final transcript for the text box; session is over
    Transcript(String),
    /// Session failed; session is over
    Failed(String),
    /// Session ended with nothing recognised
    Finished,
}

pub struct VoiceCapture {
    recognizer: Option<Box<dyn Recognizer>>,
    state: VoiceState,
    session: u64,
}

impl VoiceCapture {
    pub fn new(recognizer: Option<Box<dyn Recognizer>>) -> Self {
        Self {
            recognizer,
            state: VoiceState::Idle,
            session: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == VoiceState::Listening
    }

    /// Start a session when idle, stop the current one when listening.
    /// Returns the new state.
    pub fn toggle(&mut self, tx: mpsc::UnboundedSender<CaptureEvent>) -> Result<VoiceState> {
        if self.is_listening() {
            self.stop();
            return Ok(self.state);
        }

        let recognizer = self
            .recognizer
            .as_mut()
            .ok_or_else(|| ChatError::Recognizer("no speech recognizer configured".to_string()))?;

        self.session += 1;
        recognizer.start(self.session, tx)?;
        self.state = VoiceState::Listening;
        tracing::debug!(session = self.session, "voice session started");
        Ok(self.state)
    }

    pub fn stop(&mut self) {
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        if self.is_listening() {
            tracing::debug!(session = self.session, "voice session stopped");
        }
        self.state = VoiceState::Idle;
    }

    pub fn handle(&mut self, event: VoiceEvent) -> VoiceOutcome {
        if event.session != self.session || !self.is_listening() {
            return VoiceOutcome::Ignored;
        }

        match event.kind {
            VoiceEventKind::Interim(text) => VoiceOutcome::Interim(text),
            VoiceEventKind::Final(text) => {
                self.stop();
                VoiceOutcome::Transcript(text)
            }
            VoiceEventKind::Error(message) => {
                tracing::warn!(session = self.session, %message, "speech recognition failed");
                self.stop();
                VoiceOutcome::Failed(message)
            }
            VoiceEventKind::Ended => {
                self.stop();
                VoiceOutcome::Finished
            }
        }
    }
}

/// Runs an external transcription command through `sh -c`.
///
/// Each stdout line is an interim fragment; the last non-empty line at a
/// successful exit is the final fragment.
pub struct CommandRecognizer {
    command: String,
    task: Option<JoinHandle<()>>,
}

impl CommandRecognizer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            task: None,
        }
    }
}

impl Recognizer for CommandRecognizer {
    fn start(&mut self, session: u64, tx: mpsc::UnboundedSender<CaptureEvent>) -> Result<()> {
        self.stop();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ChatError::Recognizer(format!("failed to start `{}`: {}", self.command, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChatError::Recognizer("recognizer stdout unavailable".to_string()))?;

        self.task = Some(tokio::spawn(async move {
            let send = |kind| {
                let _ = tx.send(CaptureEvent::Voice(VoiceEvent { session, kind }));
            };

            let mut lines = BufReader::new(stdout).lines();
            let mut last = None;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        send(VoiceEventKind::Interim(line.clone()));
                        last = Some(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        send(VoiceEventKind::Error(e.to_string()));
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => match last {
                    Some(text) => send(VoiceEventKind::Final(text)),
                    None => send(VoiceEventKind::Ended),
                },
                Ok(status) => send(VoiceEventKind::Error(format!("recognizer exited with {}", status))),
                Err(e) => send(VoiceEventKind::Error(e.to_string())),
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for CommandRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}
