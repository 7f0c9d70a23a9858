use thiserror::Error;
use tracing::{debug, info};

use crate::audio::RecordingArtifact;
use crate::config::{TranscriptionConfig, TranscriptionMode};
use crate::transcription::cancel::CancelToken;
use crate::transcription::local::LocalBackend;
use crate::transcription::remote::RemoteBackend;

/// Failures a transcription attempt can surface
///
/// Every variant renders to a display string suitable for the session
/// error state. A failed transcription is terminal for its session;
/// the coordinator never retries.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// The selected on-device model is not installed
    #[error("no speech model available: {0}")]
    NoModelAvailable(String),

    /// The model file exists but could not be loaded
    #[error("failed to load speech model: {0}")]
    ModelLoadFailed(String),

    /// The captured audio artifact could not be read back
    #[error("could not read captured audio: {0}")]
    AudioUnreadable(String),

    /// Transport-level failure talking to the remote backend
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered but refused the request
    #[error("transcription rejected: {0}")]
    BackendRejected(String),

    /// The backend answered without any recognizable text payload
    #[error("no text returned by the transcription backend")]
    NoTextReturned,

    /// Cancellation was observed at a checkpoint; never shown to the user
    #[error("transcription cancelled")]
    Cancelled,
}

/// A speech-to-text backend
///
/// Implementations consume the artifact's WAV file and either return
/// the recognized text or a typed failure. `validate` diagnoses an
/// unusable configuration without transcribing anything.
pub trait SpeechBackend: Send + Sync {
    /// Transcribe the artifact to text
    ///
    /// # Errors
    /// Returns a [`TranscribeError`] describing why recognition failed
    fn transcribe(&self, artifact: &RecordingArtifact) -> Result<String, TranscribeError>;

    /// Human-readable reason the backend is currently unusable, if any
    fn validate(&self) -> Option<String>;
}

/// Selects the active backend and runs one cancellable transcription
///
/// Concurrency contract: callers issue at most one outstanding
/// `transcribe` per session. The on-device backend additionally
/// serializes all calls process-wide through its own worker thread,
/// so overlapping sessions can never reach the model concurrently.
pub struct TranscriptionCoordinator {
    mode: TranscriptionMode,
    local: Box<dyn SpeechBackend>,
    remote: Box<dyn SpeechBackend>,
}

impl TranscriptionCoordinator {
    /// Builds the coordinator with the real local and remote backends
    ///
    /// # Errors
    /// Returns error if the local worker thread cannot be spawned
    pub fn new(config: &TranscriptionConfig) -> anyhow::Result<Self> {
        let language = config.language_code().map(str::to_owned);
        let local = LocalBackend::new(&config.local, language.clone())?;
        let remote = RemoteBackend::new(&config.remote, language);

        Ok(Self::with_backends(
            config.mode,
            Box::new(local),
            Box::new(remote),
        ))
    }

    /// Builds a coordinator from arbitrary backends (dependency injection seam)
    #[must_use]
    pub fn with_backends(
        mode: TranscriptionMode,
        local: Box<dyn SpeechBackend>,
        remote: Box<dyn SpeechBackend>,
    ) -> Self {
        Self {
            mode,
            local,
            remote,
        }
    }

    fn active(&self) -> &dyn SpeechBackend {
        match self.mode {
            TranscriptionMode::Local => self.local.as_ref(),
            TranscriptionMode::Remote => self.remote.as_ref(),
        }
    }

    /// Runs one transcription against the active backend
    ///
    /// Cancellation is observed before backend work begins and again
    /// immediately before the result would be delivered; a result
    /// produced after cancellation is discarded.
    ///
    /// # Errors
    /// Returns a [`TranscribeError`], including [`TranscribeError::Cancelled`]
    /// when a checkpoint observed the token
    pub fn transcribe(
        &self,
        artifact: &RecordingArtifact,
        cancel: &CancelToken,
    ) -> Result<String, TranscribeError> {
        if cancel.is_cancelled() {
            debug!("cancellation observed before backend dispatch");
            return Err(TranscribeError::Cancelled);
        }

        let mode = self.mode;
        let start = std::time::Instant::now();
        let result = self.active().transcribe(artifact);
        let elapsed_ms = start.elapsed().as_millis();

        if cancel.is_cancelled() {
            debug!(?mode, elapsed_ms, "discarding transcription result produced after cancellation");
            return Err(TranscribeError::Cancelled);
        }

        match &result {
            Ok(text) => info!(?mode, text_len = text.len(), elapsed_ms, "transcription completed"),
            Err(err) => info!(?mode, %err, elapsed_ms, "transcription failed"),
        }

        result
    }

    /// Diagnoses an unusable active backend without transcribing
    ///
    /// Used for proactive startup warnings, not by the state machine.
    #[must_use]
    pub fn validate_configuration(&self) -> Option<String> {
        self.active().validate()
    }
}
