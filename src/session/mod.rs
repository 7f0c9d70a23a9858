/// The session state machine
pub mod machine;
/// Wiring between the machine and capture/transcription/insertion
pub mod pipeline;

pub use machine::{SessionDelegate, SessionMachine};
pub use pipeline::SessionPipeline;

/// One dictation session's current phase
///
/// Exactly one value holds at any instant; only the state machine
/// mutates it, in response to events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the hotkey
    Idle,
    /// Microphone live, user speaking
    Recording,
    /// Transcription task in flight
    Processing,
    /// Transcript delivered to the focused application
    Success,
    /// Transcript left on the clipboard (no input simulation)
    CopiedToClipboard,
    /// Something went wrong; the message is user-visible
    Error(String),
    /// Transcript was empty or whitespace-only
    Empty,
    /// User cancelled mid-session
    Cancelled,
}

/// Everything that can happen to a session
///
/// Produced by the hotkey layer, the transcription pipeline, the
/// presentation layer, and OS interruption detectors; consumed
/// exclusively by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Push-to-talk chord pressed
    HotkeyPressed,
    /// Push-to-talk chord released (or an explicit stop request)
    StopRecording,
    /// The transcription task was dispatched
    TranscriptionStarted,
    /// The transcription task produced text
    TranscriptionCompleted(String),
    /// The transcription task failed; the string is user-visible
    TranscriptionFailed(String),
    /// Cancel key pressed while the session UI is visible
    EscapePressed,
    /// The presentation layer finished its dismiss animation
    DismissCompleted,
    /// System-level interruption: snap back to idle unconditionally
    ForceReset,
}
