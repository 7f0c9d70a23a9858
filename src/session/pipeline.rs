use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::RecordingArtifact;
use crate::insertion::{InsertOutcome, TextInserter};
use crate::session::machine::SessionDelegate;
use crate::session::SessionEvent;
use crate::transcription::{CancelToken, TranscribeError, TranscriptionCoordinator};

/// Capture operations the pipeline drives
///
/// A seam over [`crate::audio::AudioCapture`] so the pipeline can be
/// exercised without audio hardware.
pub trait RecordingCapture: Send {
    /// Begin capturing
    ///
    /// # Errors
    /// Returns error when the device cannot start (a setup failure)
    fn start(&mut self) -> anyhow::Result<()>;

    /// Stop capturing; `None` when no capture was active
    ///
    /// # Errors
    /// Returns error when the artifact cannot be produced
    fn stop(&mut self) -> anyhow::Result<Option<RecordingArtifact>>;
}

impl RecordingCapture for crate::audio::AudioCapture {
    fn start(&mut self) -> anyhow::Result<()> {
        self.start_recording()
    }

    fn stop(&mut self) -> anyhow::Result<Option<RecordingArtifact>> {
        self.stop_recording()
    }
}

/// Connects the state machine's side effects to capture, transcription
/// and insertion
///
/// Implements [`SessionDelegate`]: the machine invokes these callbacks
/// synchronously; transcription itself runs as one background blocking
/// task per session whose outcome is fed back into the machine's event
/// channel. The artifact is consumed exactly once and deleted whichever
/// way the task ends.
pub struct SessionPipeline {
    capture: Mutex<Box<dyn RecordingCapture>>,
    coordinator: Arc<TranscriptionCoordinator>,
    inserter: Arc<TextInserter>,
    events: mpsc::UnboundedSender<SessionEvent>,
    active: Arc<Mutex<Option<CancelToken>>>,
}

impl SessionPipeline {
    /// Wires the pipeline to its collaborators and the event channel
    #[must_use]
    pub fn new(
        capture: Box<dyn RecordingCapture>,
        coordinator: Arc<TranscriptionCoordinator>,
        inserter: Arc<TextInserter>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            capture: Mutex::new(capture),
            coordinator,
            inserter,
            events,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Dispatches one cancellable transcription task for the artifact
    ///
    /// At most one task may be outstanding; a duplicate dispatch is
    /// rejected and its artifact discarded.
    fn spawn_transcription(&self, artifact: RecordingArtifact) {
        let token = CancelToken::new();

        {
            let Ok(mut active) = self.active.lock() else {
                warn!("active-task lock poisoned, discarding artifact");
                artifact.delete();
                return;
            };
            if active.is_some() {
                warn!("transcription already in flight, discarding duplicate dispatch");
                artifact.delete();
                return;
            }
            *active = Some(token.clone());
        }

        let _ = self.events.send(SessionEvent::TranscriptionStarted);

        let coordinator = Arc::clone(&self.coordinator);
        let events = self.events.clone();
        let active = Arc::clone(&self.active);

        tokio::task::spawn_blocking(move || {
            let result = coordinator.transcribe(&artifact, &token);
            artifact.delete();

            // Free the single-flight slot, unless cancellation already
            // handed it to a newer session.
            if let Ok(mut slot) = active.lock() {
                if slot.as_ref().is_some_and(|current| current.same_token(&token)) {
                    slot.take();
                }
            }

            match result {
                Ok(text) => {
                    let _ = events.send(SessionEvent::TranscriptionCompleted(text));
                }
                Err(TranscribeError::Cancelled) => {
                    debug!("transcription result discarded after cancellation");
                }
                Err(err) => {
                    let _ = events.send(SessionEvent::TranscriptionFailed(err.to_string()));
                }
            }
        });
    }
}

impl SessionDelegate for SessionPipeline {
    fn on_show_panel(&self) {
        // Presentation layer integration point
        info!("session panel visible");
    }

    fn on_hide_panel(&self) {
        info!("session panel dismissing");
    }

    fn on_start_recording(&self) -> Result<(), String> {
        let mut capture = self
            .capture
            .lock()
            .map_err(|_| "capture lock poisoned".to_owned())?;
        capture.start().map_err(|e| e.to_string())
    }

    fn on_stop_recording(&self) {
        let stopped = match self.capture.lock() {
            Ok(mut capture) => capture.stop(),
            Err(_) => Err(anyhow::anyhow!("capture lock poisoned")),
        };

        match stopped {
            Ok(Some(artifact)) => self.spawn_transcription(artifact),
            // Second stop of the same session: the capture is already
            // drained, nothing to dispatch
            Ok(None) => debug!("no active capture to stop"),
            Err(err) => {
                warn!(%err, "failed to stop capture");
                let _ = self.events.send(SessionEvent::TranscriptionFailed(format!(
                    "could not stop recording: {err}"
                )));
            }
        }
    }

    fn on_cancel(&self) {
        if let Ok(mut active) = self.active.lock() {
            if let Some(token) = active.take() {
                token.cancel();
                debug!("transcription task cancelled");
            }
        }

        // Discard a still-running capture and its audio
        if let Ok(mut capture) = self.capture.lock() {
            match capture.stop() {
                Ok(Some(artifact)) => artifact.delete(),
                Ok(None) => {}
                Err(err) => warn!(%err, "failed to stop capture during cancel"),
            }
        }
    }

    fn on_insert_text(&self, text: &str) -> InsertOutcome {
        self.inserter.insert_text(text)
    }
}
