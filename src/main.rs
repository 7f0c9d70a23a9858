//! voicedrop binary: wires the session core to the operating system.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use global_hotkey::GlobalHotKeyEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};

use voicedrop::audio::{cleanup, AudioCapture};
use voicedrop::config::Config;
use voicedrop::input::HotkeyListener;
use voicedrop::insertion::keystroke::SystemPasteKeys;
use voicedrop::insertion::{pasteboard, TextInserter};
use voicedrop::session::{SessionEvent, SessionMachine, SessionPipeline, SessionState};
use voicedrop::transcription::TranscriptionCoordinator;
use voicedrop::{permissions, telemetry};

/// How long a finished session stays on screen before dismissing
const DISMISS_DELAY: Duration = Duration::from_millis(1200);
/// Global hotkey poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[allow(clippy::print_stdout)]
#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    telemetry::init(config.telemetry.enabled, &config.telemetry.log_path)?;
    info!("voicedrop starting");

    permissions::preflight()?;

    // Backstop sweep for artifacts orphaned by crashes or force resets
    let recordings_dir = Config::expand_path(&config.audio.recordings_dir)?;
    match cleanup::cleanup_old_recordings(&recordings_dir, &config.recordings) {
        Ok(0) => {}
        Ok(deleted) => info!(deleted, "stale recordings removed"),
        Err(err) => warn!(%err, "recording cleanup failed"),
    }

    let capture = AudioCapture::new(&config.audio).context("audio capture setup failed")?;

    // Presentation stand-in: surface the live level at trace verbosity
    let levels = capture.level_monitor();
    tokio::spawn(async move {
        let mut last = 0.0_f32;
        loop {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let level = levels.get();
            if (level - last).abs() > 0.05 {
                tracing::trace!(level, "audio level");
                last = level;
            }
        }
    });

    let coordinator = Arc::new(
        TranscriptionCoordinator::new(&config.transcription)
            .context("transcription coordinator setup failed")?,
    );
    if let Some(reason) = coordinator.validate_configuration() {
        warn!(%reason, "active transcription backend is not usable yet");
        println!("Warning: {reason}");
    }

    let inserter = Arc::new(TextInserter::new(
        pasteboard::system_pasteboard().context("clipboard unavailable")?,
        Box::new(SystemPasteKeys::new()),
        config.insertion.clone(),
    ));

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let pipeline = SessionPipeline::new(
        Box::new(capture),
        coordinator,
        inserter,
        events_tx.clone(),
    );
    let mut machine = SessionMachine::new(Box::new(pipeline));

    let mut hotkeys = HotkeyListener::new(&config.hotkey, events_tx.clone())?;

    spawn_interruption_watch(events_tx.clone());

    println!(
        "voicedrop is running. Hold {:?}+{} to dictate, Ctrl+C to exit.",
        config.hotkey.modifiers, config.hotkey.key
    );
    info!("event loop running");

    let hotkey_events = GlobalHotKeyEvent::receiver();
    loop {
        while let Ok(event) = hotkey_events.try_recv() {
            hotkeys.handle_event(&event);
        }

        tokio::select! {
            maybe_event = events_rx.recv() => {
                let Some(event) = maybe_event else { break };
                machine.handle_event(event);
                hotkeys.set_session_visible(machine.state() != &SessionState::Idle);
                schedule_dismiss(machine.state(), &events_tx);
            }
            () = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                println!("\nShutting down...");
                break;
            }
        }
    }

    Ok(())
}

/// Stands in for the presentation layer's dismiss animation: a settled
/// session stays visible briefly, then reports its dismissal.
fn schedule_dismiss(state: &SessionState, events: &mpsc::UnboundedSender<SessionEvent>) {
    let settled = matches!(
        state,
        SessionState::Success
            | SessionState::CopiedToClipboard
            | SessionState::Error(_)
            | SessionState::Empty
            | SessionState::Cancelled
    );
    if !settled {
        return;
    }

    let events = events.clone();
    tokio::spawn(async move {
        tokio::time::sleep(DISMISS_DELAY).await;
        let _ = events.send(SessionEvent::DismissCompleted);
    });
}

/// Forwards system-level interruptions as force resets
///
/// SIGHUP covers display reconfiguration and session teardown on the
/// platforms that deliver it; the machine snaps to idle without
/// waiting on any in-flight work.
#[cfg(unix)]
fn spawn_interruption_watch(events: mpsc::UnboundedSender<SessionEvent>) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let Ok(mut hangup) = signal(SignalKind::hangup()) else {
            warn!("could not install interruption handler");
            return;
        };
        while hangup.recv().await.is_some() {
            warn!("system interruption signal received");
            let _ = events.send(SessionEvent::ForceReset);
        }
    });
}

#[cfg(not(unix))]
fn spawn_interruption_watch(_events: mpsc::UnboundedSender<SessionEvent>) {}
