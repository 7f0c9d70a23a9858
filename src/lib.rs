//! voicedrop - push-to-talk dictation
//!
//! Hold a hotkey, speak, release, and the transcript is pasted into
//! whatever application has focus. The session state machine in
//! [`session`] owns all orchestration; [`audio`], [`transcription`]
//! and [`insertion`] are the collaborators it drives.

/// Audio capture and artifact management
pub mod audio;
/// Configuration management
pub mod config;
/// Global hotkey registration
pub mod input;
/// Clipboard-based text insertion
pub mod insertion;
/// OS permission checks
pub mod permissions;
/// Session state machine and pipeline wiring
pub mod session;
/// Log output setup
pub mod telemetry;
/// Speech-to-text backends and dispatch
pub mod transcription;
