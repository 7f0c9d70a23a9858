use tracing::{debug, info, warn};

use crate::insertion::InsertOutcome;
use crate::session::{SessionEvent, SessionState};

/// Collaborator interface driven by the state machine
///
/// The presentation, audio, and insertion layers implement this; the
/// machine holds exactly one delegate and invokes it synchronously as
/// transition side effects.
#[cfg_attr(test, mockall::automock)]
pub trait SessionDelegate: Send {
    /// Session UI should become visible
    fn on_show_panel(&self);
    /// Session UI should animate out
    fn on_hide_panel(&self);
    /// Begin audio capture; an `Err` is a setup failure with a
    /// user-visible message
    fn on_start_recording(&self) -> Result<(), String>;
    /// Stop capture and hand the artifact to the transcription pipeline
    fn on_stop_recording(&self);
    /// Cancel the in-flight transcription and discard the recording
    fn on_cancel(&self);
    /// Deliver the transcript to the focused application
    fn on_insert_text(&self, text: &str) -> InsertOutcome;
}

/// The session orchestrator
///
/// Holds the single source of truth for session state. Events are
/// handled one at a time on whatever context owns the machine; a
/// transition and its synchronous side effects complete before the
/// next event is processed. Any (state, event) pair outside the
/// transition table is ignored.
pub struct SessionMachine {
    state: SessionState,
    mock_mode: bool,
    delegate: Box<dyn SessionDelegate>,
}

impl SessionMachine {
    /// Creates the machine in `Idle` with the given delegate
    #[must_use]
    pub fn new(delegate: Box<dyn SessionDelegate>) -> Self {
        Self {
            state: SessionState::Idle,
            mock_mode: false,
            delegate,
        }
    }

    /// Current session state
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Enables or disables mock mode
    ///
    /// Mock mode suppresses the recording/transcription/cancel/insert
    /// side effects while still driving real state transitions and
    /// panel callbacks, for deterministic UI-only testing. It clears
    /// itself whenever the state returns to `Idle` by any path.
    pub fn set_mock_mode(&mut self, enabled: bool) {
        info!(enabled, "mock mode");
        self.mock_mode = enabled;
    }

    /// Whether mock mode is currently active
    #[must_use]
    pub fn mock_mode(&self) -> bool {
        self.mock_mode
    }

    /// Processes one event against the transition table
    pub fn handle_event(&mut self, event: SessionEvent) {
        debug!(state = ?self.state, ?event, "session event");

        match event {
            SessionEvent::HotkeyPressed => match self.state {
                SessionState::Idle => self.begin_session(),
                SessionState::Recording => self.request_stop(),
                _ => self.ignore(&SessionEvent::HotkeyPressed),
            },

            SessionEvent::StopRecording => {
                if self.state == SessionState::Recording {
                    self.request_stop();
                } else {
                    self.ignore(&SessionEvent::StopRecording);
                }
            }

            SessionEvent::TranscriptionStarted => {
                if self.state == SessionState::Recording {
                    self.transition(SessionState::Processing);
                } else {
                    self.ignore(&SessionEvent::TranscriptionStarted);
                }
            }

            SessionEvent::TranscriptionCompleted(text) => {
                if self.in_flight() {
                    self.finish_transcription(&text);
                } else {
                    self.ignore(&SessionEvent::TranscriptionCompleted(text));
                }
            }

            SessionEvent::TranscriptionFailed(reason) => {
                if self.in_flight() {
                    self.transition(SessionState::Error(reason));
                } else {
                    self.ignore(&SessionEvent::TranscriptionFailed(reason));
                }
            }

            SessionEvent::EscapePressed => {
                if self.in_flight() {
                    if !self.mock_mode {
                        self.delegate.on_cancel();
                    }
                    self.delegate.on_hide_panel();
                    self.transition(SessionState::Cancelled);
                } else {
                    self.ignore(&SessionEvent::EscapePressed);
                }
            }

            SessionEvent::DismissCompleted => {
                if self.is_terminal() {
                    self.mock_mode = false;
                    self.transition(SessionState::Idle);
                } else {
                    self.ignore(&SessionEvent::DismissCompleted);
                }
            }

            SessionEvent::ForceReset => self.force_reset(),
        }
    }

    /// Snaps the state back to `Idle` without invoking any callback
    ///
    /// For system-level interruptions (display reconfiguration, sleep)
    /// that must never block on in-flight work: the owning process is
    /// responsible for its own emergency cleanup of recording,
    /// transcription, and panel resources.
    pub fn force_reset(&mut self) {
        warn!(state = ?self.state, "emergency reset to idle");
        self.mock_mode = false;
        self.state = SessionState::Idle;
    }

    fn begin_session(&mut self) {
        self.delegate.on_show_panel();

        if self.mock_mode {
            self.transition(SessionState::Recording);
            return;
        }

        match self.delegate.on_start_recording() {
            Ok(()) => self.transition(SessionState::Recording),
            Err(message) => {
                // Setup failure: no recording was started, report loudly
                warn!(%message, "recording setup failed");
                self.transition(SessionState::Error(message));
            }
        }
    }

    /// Recording continues until `TranscriptionStarted`; the stop side
    /// effect is idempotent downstream (a drained capture yields no
    /// second artifact).
    fn request_stop(&mut self) {
        if !self.mock_mode {
            self.delegate.on_stop_recording();
        }
    }

    fn finish_transcription(&mut self, text: &str) {
        let trimmed = text.trim();

        if trimmed.is_empty() {
            info!("transcript empty after trimming");
            self.transition(SessionState::Empty);
            return;
        }

        if self.mock_mode {
            // UI-only runs must not paste into the tester's focus
            self.transition(SessionState::Success);
            return;
        }

        match self.delegate.on_insert_text(trimmed) {
            InsertOutcome::Inserted => self.transition(SessionState::Success),
            InsertOutcome::CopiedToClipboardOnly => {
                self.transition(SessionState::CopiedToClipboard);
            }
            InsertOutcome::Failed => {
                // A transcript that could not be delivered is an error,
                // never a silent downgrade.
                self.transition(SessionState::Error("insertion failed".to_owned()));
            }
        }
    }

    const fn in_flight(&self) -> bool {
        matches!(
            self.state,
            SessionState::Recording | SessionState::Processing
        )
    }

    const fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            SessionState::Success
                | SessionState::CopiedToClipboard
                | SessionState::Error(_)
                | SessionState::Empty
                | SessionState::Cancelled
        )
    }

    fn ignore(&self, event: &SessionEvent) {
        debug!(state = ?self.state, ?event, "event ignored in current state");
    }

    fn transition(&mut self, next: SessionState) {
        info!(from = ?self.state, to = ?next, "session transition");
        self.state = next;
    }
}
