/// Cooperative cancellation token
pub mod cancel;
/// Backend selection and single-flight dispatch
pub mod coordinator;
/// On-device whisper backend, serialized through a worker thread
pub mod local;
/// Remote OpenAI-compatible backend
pub mod remote;

pub use cancel::CancelToken;
pub use coordinator::{SpeechBackend, TranscribeError, TranscriptionCoordinator};
