use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::InsertionConfig;
use crate::insertion::keystroke::PasteKeys;
use crate::insertion::pasteboard::{Pasteboard, PasteboardSnapshot};

/// How often the revision counter is sampled while waiting for a commit
const COMMIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Base delay between write-verify attempts; escalates per attempt
const VERIFY_RETRY_STEP: Duration = Duration::from_millis(50);

/// Result of one insertion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Text was pasted at the input focus and the clipboard handled
    Inserted,
    /// Input simulation unavailable; text left on the clipboard instead
    CopiedToClipboardOnly,
    /// Delivery failed; the original clipboard was restored
    Failed,
}

/// Places text at the current input focus via the clipboard
///
/// One instance guards the whole process: a second call while an
/// insertion is in flight is rejected immediately, never queued,
/// because interleaved paste sequences would corrupt arbitrary target
/// applications. The caller's original clipboard content is restored
/// on every exit path except when another process already overwrote it
/// during the paste-settle window.
pub struct TextInserter {
    // The lock doubles as the process-wide insertion mutex; the
    // pasteboard lives inside it so clipboard access is impossible
    // without holding the exclusivity guard.
    inner: Mutex<Box<dyn Pasteboard>>,
    keys: Box<dyn PasteKeys>,
    config: InsertionConfig,
}

impl TextInserter {
    /// Builds the inserter around a clipboard and a paste synthesizer
    #[must_use]
    pub fn new(
        pasteboard: Box<dyn Pasteboard>,
        keys: Box<dyn PasteKeys>,
        config: InsertionConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(pasteboard),
            keys,
            config,
        }
    }

    /// Attempts to insert `text` at the current input focus
    ///
    /// See the module invariants; this never blocks waiting for a
    /// concurrent insertion.
    pub fn insert_text(&self, text: &str) -> InsertOutcome {
        let Ok(mut pasteboard) = self.inner.try_lock() else {
            warn!("insertion already in flight, rejecting concurrent attempt");
            return InsertOutcome::Failed;
        };

        let outcome = run_protocol(
            pasteboard.as_mut(),
            self.keys.as_ref(),
            &self.config,
            text,
        );
        info!(?outcome, text_len = text.len(), "insertion finished");
        outcome
    }
}

fn run_protocol(
    pasteboard: &mut dyn Pasteboard,
    keys: &dyn PasteKeys,
    config: &InsertionConfig,
    text: &str,
) -> InsertOutcome {
    // No input simulation capability: leave the text on the clipboard
    // for a manual paste. The user asked for this content, so no
    // snapshot/restore applies here.
    if !keys.available() {
        info!("input simulation unavailable, copying to clipboard only");
        return match pasteboard.write_text(text) {
            Ok(()) => InsertOutcome::CopiedToClipboardOnly,
            Err(e) => {
                error!(%e, "clipboard-only copy failed");
                InsertOutcome::Failed
            }
        };
    }

    // Snapshot everything before the first write so rich content the
    // user had copied survives.
    let snapshot = pasteboard.snapshot();

    if !write_and_verify(pasteboard, text, config) {
        error!("clipboard write could not be verified, restoring original content");
        restore_snapshot(pasteboard, &snapshot);
        return InsertOutcome::Failed;
    }

    if let Err(e) = keys.send_paste() {
        error!(%e, "paste keystroke failed, restoring original clipboard");
        restore_snapshot(pasteboard, &snapshot);
        return InsertOutcome::Failed;
    }

    // Give the target application time to read the clipboard.
    std::thread::sleep(Duration::from_millis(config.settle_ms));

    // Restore only if the clipboard still holds our text; anything else
    // means the user or another process got there first and restoring
    // would clobber their content.
    match pasteboard.read_text() {
        Some(current) if current == text => restore_snapshot(pasteboard, &snapshot),
        _ => debug!("clipboard changed during settle window, leaving it as-is"),
    }

    InsertOutcome::Inserted
}

/// Write-verify loop: a write only counts once the revision counter
/// advances and a re-read returns exactly the written text.
fn write_and_verify(
    pasteboard: &mut dyn Pasteboard,
    text: &str,
    config: &InsertionConfig,
) -> bool {
    let commit_window = Duration::from_millis(config.commit_timeout_ms);

    for attempt in 1..=config.max_attempts {
        let before = pasteboard.change_count();

        match pasteboard.write_text(text) {
            Ok(()) => {
                let committed = wait_for_commit(pasteboard, before, commit_window);
                if pasteboard.read_text().as_deref() == Some(text) {
                    if !committed {
                        // Counter did not advance (e.g. identical content
                        // was already present); content equality decides.
                        debug!(attempt, "revision counter static but content matches");
                    }
                    debug!(attempt, "clipboard write verified");
                    return true;
                }
                warn!(attempt, committed, "clipboard content mismatch after write");
            }
            Err(e) => warn!(attempt, %e, "clipboard write failed"),
        }

        if attempt < config.max_attempts {
            // Escalating delay lets transient write races settle.
            std::thread::sleep(VERIFY_RETRY_STEP * attempt);
        }
    }

    false
}

/// Polls the revision counter until it moves or the window elapses
fn wait_for_commit(pasteboard: &mut dyn Pasteboard, before: i64, window: Duration) -> bool {
    let deadline = Instant::now() + window;
    loop {
        if pasteboard.change_count() != before {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(COMMIT_POLL_INTERVAL);
    }
}

fn restore_snapshot(pasteboard: &mut dyn Pasteboard, snapshot: &PasteboardSnapshot) {
    if let Err(e) = pasteboard.restore(snapshot) {
        warn!(%e, "failed to restore original clipboard content");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insertion::keystroke::KeystrokeError;
    use crate::insertion::pasteboard::PasteboardError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const TEXT_FORMAT: &str = "public.utf8-plain-text";

    #[derive(Default)]
    struct FakeState {
        text: Option<String>,
        change_count: i64,
        // Fault injection counters, consumed per write
        swallow_writes: u32,
        fail_writes: u32,
        corrupt_writes: u32,
        write_delay: Option<Duration>,
        writes: u32,
        snapshots: u32,
        restores: u32,
    }

    #[derive(Clone, Default)]
    struct FakePasteboard {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakePasteboard {
        fn with_text(text: &str) -> Self {
            let fake = Self::default();
            fake.state.lock().unwrap().text = Some(text.to_owned());
            fake
        }

        fn text(&self) -> Option<String> {
            self.state.lock().unwrap().text.clone()
        }

        fn set_external_text(&self, text: &str) {
            let mut state = self.state.lock().unwrap();
            state.text = Some(text.to_owned());
            state.change_count += 1;
        }

        fn stat(&self, f: impl Fn(&FakeState) -> u32) -> u32 {
            f(&self.state.lock().unwrap())
        }
    }

    impl Pasteboard for FakePasteboard {
        fn change_count(&mut self) -> i64 {
            self.state.lock().unwrap().change_count
        }

        fn read_text(&mut self) -> Option<String> {
            self.state.lock().unwrap().text.clone()
        }

        fn write_text(&mut self, text: &str) -> Result<(), PasteboardError> {
            let delay = self.state.lock().unwrap().write_delay;
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }

            let mut state = self.state.lock().unwrap();
            state.writes += 1;

            if state.fail_writes > 0 {
                state.fail_writes -= 1;
                return Err(PasteboardError::WriteFailed("injected failure".to_owned()));
            }
            if state.swallow_writes > 0 {
                // Write silently dropped: no content change, no revision bump
                state.swallow_writes -= 1;
                return Ok(());
            }
            if state.corrupt_writes > 0 {
                state.corrupt_writes -= 1;
                state.text = Some("GARBAGE".to_owned());
                state.change_count += 1;
                return Ok(());
            }

            state.text = Some(text.to_owned());
            state.change_count += 1;
            Ok(())
        }

        fn snapshot(&mut self) -> PasteboardSnapshot {
            let mut state = self.state.lock().unwrap();
            state.snapshots += 1;
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

    type PasteHook = Arc<dyn Fn() + Send + Sync>;

    struct FakeKeys {
        available: bool,
        fail: bool,
        pastes: Arc<AtomicU32>,
        on_paste: Option<PasteHook>,
    }

    impl FakeKeys {
        fn working(pastes: Arc<AtomicU32>) -> Self {
            Self {
                available: true,
                fail: false,
                pastes,
                on_paste: None,
            }
        }
    }

    impl PasteKeys for FakeKeys {
        fn available(&self) -> bool {
            self.available
        }

        fn send_paste(&self) -> Result<(), KeystrokeError> {
            if self.fail {
                return Err(KeystrokeError::Synthesis("injected".to_owned()));
            }
            self.pastes.fetch_add(1, Ordering::SeqCst);
            if let Some(hook) = &self.on_paste {
                hook();
            }
            Ok(())
        }
    }

    fn fast_config() -> InsertionConfig {
        InsertionConfig {
            max_attempts: 3,
            commit_timeout_ms: 30,
            settle_ms: 10,
        }
    }

    fn inserter(pasteboard: FakePasteboard, keys: FakeKeys) -> TextInserter {
        TextInserter::new(Box::new(pasteboard), Box::new(keys), fast_config())
    }

    #[test]
    fn test_successful_insert_restores_original_clipboard() {
        let pasteboard = FakePasteboard::with_text("ORIGINAL");
        let pastes = Arc::new(AtomicU32::new(0));
        let keys = FakeKeys::working(Arc::clone(&pastes));
        let handle = pasteboard.clone();

        let outcome = inserter(pasteboard, keys).insert_text("NEW");

        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(pastes.load(Ordering::SeqCst), 1);
        // Clipboard still held "NEW" after the settle window, so the
        // original content came back.
        assert_eq!(handle.text().as_deref(), Some("ORIGINAL"));
        assert_eq!(handle.stat(|s| s.snapshots), 1);
        assert_eq!(handle.stat(|s| s.restores), 1);
    }

    #[test]
    fn test_empty_prior_clipboard_restored_to_empty() {
        let pasteboard = FakePasteboard::default();
        let pastes = Arc::new(AtomicU32::new(0));
        let keys = FakeKeys::working(Arc::clone(&pastes));
        let handle = pasteboard.clone();

        let outcome = inserter(pasteboard, keys).insert_text("NEW");

        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(handle.text(), None);
    }

    #[test]
    fn test_missing_capability_copies_without_snapshot() {
        let pasteboard = FakePasteboard::with_text("ORIGINAL");
        let pastes = Arc::new(AtomicU32::new(0));
        let keys = FakeKeys {
            available: false,
            fail: false,
            pastes: Arc::clone(&pastes),
            on_paste: None,
        };
        let handle = pasteboard.clone();

        let outcome = inserter(pasteboard, keys).insert_text("NEW");

        assert_eq!(outcome, InsertOutcome::CopiedToClipboardOnly);
        // The transcript intentionally stays on the clipboard.
        assert_eq!(handle.text().as_deref(), Some("NEW"));
        assert_eq!(pastes.load(Ordering::SeqCst), 0);
        assert_eq!(handle.stat(|s| s.snapshots), 0);
        assert_eq!(handle.stat(|s| s.restores), 0);
    }

    #[test]
    fn test_unverifiable_write_fails_loudly_and_restores() {
        let pasteboard = FakePasteboard::with_text("ORIGINAL");
        {
            let mut state = pasteboard.state.lock().unwrap();
            state.swallow_writes = u32::MAX;
        }
        let pastes = Arc::new(AtomicU32::new(0));
        let keys = FakeKeys::working(Arc::clone(&pastes));
        let handle = pasteboard.clone();

        let outcome = inserter(pasteboard, keys).insert_text("NEW");

        assert_eq!(outcome, InsertOutcome::Failed);
        assert_eq!(pastes.load(Ordering::SeqCst), 0);
        assert_eq!(handle.text().as_deref(), Some("ORIGINAL"));
        // All attempts were spent before giving up
        assert_eq!(handle.stat(|s| s.writes), 3);
        assert_eq!(handle.stat(|s| s.restores), 1);
    }

    #[test]
    fn test_write_errors_fail_after_all_attempts() {
        let pasteboard = FakePasteboard::with_text("ORIGINAL");
        pasteboard.state.lock().unwrap().fail_writes = u32::MAX;
        let keys = FakeKeys::working(Arc::new(AtomicU32::new(0)));
        let handle = pasteboard.clone();

        let outcome = inserter(pasteboard, keys).insert_text("NEW");

        assert_eq!(outcome, InsertOutcome::Failed);
        assert_eq!(handle.text().as_deref(), Some("ORIGINAL"));
    }

    #[test]
    fn test_transient_corruption_retried_then_succeeds() {
        let pasteboard = FakePasteboard::with_text("ORIGINAL");
        pasteboard.state.lock().unwrap().corrupt_writes = 1;
        let pastes = Arc::new(AtomicU32::new(0));
        let keys = FakeKeys::working(Arc::clone(&pastes));
        let handle = pasteboard.clone();

        let outcome = inserter(pasteboard, keys).insert_text("NEW");

        assert_eq!(outcome, InsertOutcome::Inserted);
        // First write landed garbage, second verified
        assert_eq!(handle.stat(|s| s.writes), 2);
        assert_eq!(pastes.load(Ordering::SeqCst), 1);
        assert_eq!(handle.text().as_deref(), Some("ORIGINAL"));
    }

    #[test]
    fn test_clipboard_overwritten_during_settle_left_alone() {
        let pasteboard = FakePasteboard::with_text("ORIGINAL");
        let pastes = Arc::new(AtomicU32::new(0));
        let hook_handle = pasteboard.clone();
        let keys = FakeKeys {
            available: true,
            fail: false,
            pastes: Arc::clone(&pastes),
            // The "target application" copies something of its own
            // while we wait out the settle window.
            on_paste: Some(Arc::new(move || hook_handle.set_external_text("THEIRS"))),
        };
        let handle = pasteboard.clone();

        let outcome = inserter(pasteboard, keys).insert_text("NEW");

        assert_eq!(outcome, InsertOutcome::Inserted);
        // No forced revert: the foreign content stays
        assert_eq!(handle.text().as_deref(), Some("THEIRS"));
        assert_eq!(handle.stat(|s| s.restores), 0);
    }

    #[test]
    fn test_paste_failure_restores_and_fails() {
        let pasteboard = FakePasteboard::with_text("ORIGINAL");
        let keys = FakeKeys {
            available: true,
            fail: true,
            pastes: Arc::new(AtomicU32::new(0)),
            on_paste: None,
        };
        let handle = pasteboard.clone();

        let outcome = inserter(pasteboard, keys).insert_text("NEW");

        assert_eq!(outcome, InsertOutcome::Failed);
        assert_eq!(handle.text().as_deref(), Some("ORIGINAL"));
        assert_eq!(handle.stat(|s| s.restores), 1);
    }

    #[test]
    fn test_concurrent_insertions_one_rejected_immediately() {
        let pasteboard = FakePasteboard::with_text("ORIGINAL");
        pasteboard.state.lock().unwrap().write_delay = Some(Duration::from_millis(150));
        let pastes = Arc::new(AtomicU32::new(0));
        let keys = FakeKeys::working(Arc::clone(&pastes));
        let handle = pasteboard.clone();

        let inserter = Arc::new(inserter(pasteboard, keys));

        let first = {
            let inserter = Arc::clone(&inserter);
            std::thread::spawn(move || inserter.insert_text("NEW"))
        };

        // Let the first call take the lock and park inside the write
        std::thread::sleep(Duration::from_millis(40));
        let start = Instant::now();
        let second = inserter.insert_text("NEW");
        let rejected_in = start.elapsed();

        assert_eq!(second, InsertOutcome::Failed);
        // Rejected without waiting for the in-flight insertion
        assert!(rejected_in < Duration::from_millis(100));

        assert_eq!(first.join().unwrap(), InsertOutcome::Inserted);
        assert_eq!(pastes.load(Ordering::SeqCst), 1);
        assert_eq!(handle.text().as_deref(), Some("ORIGINAL"));
    }

    #[test]
    fn test_commit_poll_detects_delayed_revision_bump() {
        // wait_for_commit returns as soon as the counter moves
        let mut pasteboard = FakePasteboard::with_text("X");
        let before = pasteboard.change_count();
        pasteboard.set_external_text("Y");
        assert!(wait_for_commit(
            &mut pasteboard,
            before,
            Duration::from_millis(50)
        ));
    }

    #[test]
    fn test_commit_poll_times_out_when_nothing_changes() {
        let mut pasteboard = FakePasteboard::with_text("X");
        let before = pasteboard.change_count();
        let start = Instant::now();
        assert!(!wait_for_commit(
            &mut pasteboard,
            before,
            Duration::from_millis(40)
        ));
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
