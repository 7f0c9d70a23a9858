//! End-to-end session tests: state machine, pipeline, coordinator and
//! insertion protocol wired together the way the binary wires them,
//! with the hardware seams (capture device, speech backend, system
//! clipboard, keystroke synthesis) replaced by probes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use voicedrop::audio::RecordingArtifact;
use voicedrop::config::{InsertionConfig, TranscriptionMode};
use voicedrop::insertion::keystroke::{KeystrokeError, PasteKeys};
use voicedrop::insertion::pasteboard::{Pasteboard, PasteboardError, PasteboardSnapshot};
use voicedrop::insertion::TextInserter;
use voicedrop::session::pipeline::RecordingCapture;
use voicedrop::session::{SessionEvent, SessionMachine, SessionPipeline, SessionState};
use voicedrop::transcription::coordinator::SpeechBackend;
use voicedrop::transcription::{TranscribeError, TranscriptionCoordinator};

const TEXT_FORMAT: &str = "public.utf8-plain-text";

#[derive(Default)]
struct ClipboardState {
    text: Option<String>,
    change_count: i64,
    restores: u32,
}

/// Clipboard probe shared between the inserter and the test assertions
#[derive(Clone, Default)]
struct ClipboardProbe {
    state: Arc<Mutex<ClipboardState>>,
}

impl ClipboardProbe {
    fn with_text(text: &str) -> Self {
        let probe = Self::default();
        probe.state.lock().unwrap().text = Some(text.to_owned());
        probe
    }

    fn text(&self) -> Option<String> {
        self.state.lock().unwrap().text.clone()
    }

    fn restores(&self) -> u32 {
        self.state.lock().unwrap().restores
    }
}

impl Pasteboard for ClipboardProbe {
    fn change_count(&mut self) -> i64 {
        self.state.lock().unwrap().change_count
    }

    fn read_text(&mut self) -> Option<String> {
        self.state.lock().unwrap().text.clone()
    }

    fn write_text(&mut self, text: &str) -> Result<(), PasteboardError> {
        let mut state = self.state.lock().unwrap();
        state.text = Some(text.to_owned());
        state.change_count += 1;
        Ok(())
    }

    fn snapshot(&mut self) -> PasteboardSnapshot {
        let state = self.state.lock().unwrap();
        match &state.text {
            Some(text) => PasteboardSnapshot::new(vec![vec![(
                TEXT_FORMAT.to_owned(),
                text.clone().into_bytes(),
            )]]),
            None => PasteboardSnapshot::default(),
        }
    }

    fn restore(&mut self, snapshot: &PasteboardSnapshot) -> Result<(), PasteboardError> {
        let mut state = self.state.lock().unwrap();
        state.restores += 1;
        state.text = snapshot
            .items()
            .iter()
            .flatten()
            .find(|(format, _)| format == TEXT_FORMAT)
            .and_then(|(_, bytes)| String::from_utf8(bytes.clone()).ok());
        state.change_count += 1;
        Ok(())
    }
}

struct ProbeKeys {
    available: bool,
    pastes: Arc<AtomicU32>,
}

impl PasteKeys for ProbeKeys {
    fn available(&self) -> bool {
        self.available
    }

    fn send_paste(&self) -> Result<(), KeystrokeError> {
        self.pastes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct ProbeCapture {
    started: bool,
    takes: u32,
}

impl RecordingCapture for ProbeCapture {
    fn start(&mut self) -> anyhow::Result<()> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<Option<RecordingArtifact>> {
        if !self.started {
            return Ok(None);
        }
        self.started = false;
        self.takes += 1;
        Ok(Some(RecordingArtifact::new(PathBuf::from(format!(
            "/tmp/voicedrop-session-flow-take-{}.wav",
            self.takes
        )))))
    }
}

struct ScriptedBackend {
    reply: Result<String, fn() -> TranscribeError>,
    delay: Duration,
}

impl ScriptedBackend {
    fn replying(text: &str) -> Box<Self> {
        Box::new(Self {
            reply: Ok(text.to_owned()),
            delay: Duration::ZERO,
        })
    }

    fn slow(text: &str, delay: Duration) -> Box<Self> {
        Box::new(Self {
            reply: Ok(text.to_owned()),
            delay,
        })
    }

    fn failing(error: fn() -> TranscribeError) -> Box<Self> {
        Box::new(Self {
            reply: Err(error),
            delay: Duration::ZERO,
        })
    }
}

impl SpeechBackend for ScriptedBackend {
    fn transcribe(&self, _artifact: &RecordingArtifact) -> Result<String, TranscribeError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.reply.clone().map_err(|make| make())
    }

    fn validate(&self) -> Option<String> {
        None
    }
}

struct Harness {
    machine: SessionMachine,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    clipboard: ClipboardProbe,
    pastes: Arc<AtomicU32>,
}

fn harness(backend: Box<dyn SpeechBackend>, paste_available: bool) -> Harness {
    let (tx, rx) = mpsc::unbounded_channel();

    let clipboard = ClipboardProbe::with_text("ORIGINAL");
    let pastes = Arc::new(AtomicU32::new(0));

    let coordinator = Arc::new(TranscriptionCoordinator::with_backends(
        TranscriptionMode::Local,
        backend,
        ScriptedBackend::failing(|| TranscribeError::NoTextReturned),
    ));
    let inserter = Arc::new(TextInserter::new(
        Box::new(clipboard.clone()),
        Box::new(ProbeKeys {
            available: paste_available,
            pastes: Arc::clone(&pastes),
        }),
        InsertionConfig {
            max_attempts: 3,
            commit_timeout_ms: 30,
            settle_ms: 10,
        },
    ));

    let pipeline = SessionPipeline::new(Box::new(ProbeCapture::default()), coordinator, inserter, tx);

    Harness {
        machine: SessionMachine::new(Box::new(pipeline)),
        events: rx,
        clipboard,
        pastes,
    }
}

impl Harness {
    /// Feeds the next pipeline event into the machine and returns it
    async fn pump(&mut self) -> SessionEvent {
        let event = tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event channel closed");
        self.machine.handle_event(event.clone());
        event
    }

    fn assert_quiet(&mut self) {
        assert!(self.events.try_recv().is_err(), "unexpected pending event");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dictation_round_trip_restores_clipboard() {
    let mut h = harness(ScriptedBackend::replying("Hello world"), true);

    h.machine.handle_event(SessionEvent::HotkeyPressed);
    assert_eq!(h.machine.state(), &SessionState::Recording);

    h.machine.handle_event(SessionEvent::StopRecording);
    assert_eq!(h.pump().await, SessionEvent::TranscriptionStarted);
    assert_eq!(h.machine.state(), &SessionState::Processing);

    assert_eq!(
        h.pump().await,
        SessionEvent::TranscriptionCompleted("Hello world".to_owned())
    );
    assert_eq!(h.machine.state(), &SessionState::Success);

    // The transcript was pasted, then the prior clipboard came back
    assert_eq!(h.pastes.load(Ordering::SeqCst), 1);
    assert_eq!(h.clipboard.text().as_deref(), Some("ORIGINAL"));
    assert_eq!(h.clipboard.restores(), 1);

    h.machine.handle_event(SessionEvent::DismissCompleted);
    assert_eq!(h.machine.state(), &SessionState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_paste_capability_lands_in_copied_state() {
    let mut h = harness(ScriptedBackend::replying("fallback text"), false);

    h.machine.handle_event(SessionEvent::HotkeyPressed);
    h.machine.handle_event(SessionEvent::StopRecording);
    h.pump().await;
    h.pump().await;

    assert_eq!(h.machine.state(), &SessionState::CopiedToClipboard);
    // The transcript intentionally stays on the clipboard for a manual paste
    assert_eq!(h.clipboard.text().as_deref(), Some("fallback text"));
    assert_eq!(h.pastes.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_escape_mid_processing_discards_late_result() {
    let mut h = harness(
        ScriptedBackend::slow("too late", Duration::from_millis(150)),
        true,
    );

    h.machine.handle_event(SessionEvent::HotkeyPressed);
    h.machine.handle_event(SessionEvent::StopRecording);
    assert_eq!(h.pump().await, SessionEvent::TranscriptionStarted);

    h.machine.handle_event(SessionEvent::EscapePressed);
    assert_eq!(h.machine.state(), &SessionState::Cancelled);

    // The backend finishes while cancelled; its result never surfaces
    tokio::time::sleep(Duration::from_millis(300)).await;
    h.assert_quiet();
    assert_eq!(h.machine.state(), &SessionState::Cancelled);
    assert_eq!(h.clipboard.text().as_deref(), Some("ORIGINAL"));

    h.machine.handle_event(SessionEvent::DismissCompleted);
    assert_eq!(h.machine.state(), &SessionState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_whitespace_transcript_lands_in_empty() {
    let mut h = harness(ScriptedBackend::replying("   \n "), true);

    h.machine.handle_event(SessionEvent::HotkeyPressed);
    h.machine.handle_event(SessionEvent::StopRecording);
    h.pump().await;
    h.pump().await;

    assert_eq!(h.machine.state(), &SessionState::Empty);
    // No insertion attempted, clipboard untouched
    assert_eq!(h.pastes.load(Ordering::SeqCst), 0);
    assert_eq!(h.clipboard.text().as_deref(), Some("ORIGINAL"));
    assert_eq!(h.clipboard.restores(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_backend_failure_lands_in_error_with_reason() {
    let mut h = harness(
        ScriptedBackend::failing(|| TranscribeError::Network("connection refused".to_owned())),
        true,
    );

    h.machine.handle_event(SessionEvent::HotkeyPressed);
    h.machine.handle_event(SessionEvent::StopRecording);
    assert_eq!(h.pump().await, SessionEvent::TranscriptionStarted);

    match h.pump().await {
        SessionEvent::TranscriptionFailed(reason) => {
            assert!(reason.contains("network error"));
        }
        other => panic!("expected TranscriptionFailed, got {other:?}"),
    }

    assert!(matches!(h.machine.state(), SessionState::Error(_)));
    assert_eq!(h.clipboard.text().as_deref(), Some("ORIGINAL"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_force_reset_mid_processing_snaps_to_idle() {
    let mut h = harness(
        ScriptedBackend::slow("ignored", Duration::from_millis(100)),
        true,
    );

    h.machine.handle_event(SessionEvent::HotkeyPressed);
    h.machine.handle_event(SessionEvent::StopRecording);
    assert_eq!(h.pump().await, SessionEvent::TranscriptionStarted);

    h.machine.handle_event(SessionEvent::ForceReset);
    assert_eq!(h.machine.state(), &SessionState::Idle);

    // The still-running task resolves afterwards; its completion event
    // is outside the transition table for Idle and must change nothing.
    assert_eq!(
        h.pump().await,
        SessionEvent::TranscriptionCompleted("ignored".to_owned())
    );
    assert_eq!(h.machine.state(), &SessionState::Idle);
    assert_eq!(h.pastes.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sessions_repeat_cleanly() {
    let mut h = harness(ScriptedBackend::replying("again"), true);

    for _ in 0..3 {
        h.machine.handle_event(SessionEvent::HotkeyPressed);
        h.machine.handle_event(SessionEvent::StopRecording);
        h.pump().await;
        h.pump().await;
        assert_eq!(h.machine.state(), &SessionState::Success);

        h.machine.handle_event(SessionEvent::DismissCompleted);
        assert_eq!(h.machine.state(), &SessionState::Idle);
    }

    assert_eq!(h.pastes.load(Ordering::SeqCst), 3);
    assert_eq!(h.clipboard.text().as_deref(), Some("ORIGINAL"));
}
