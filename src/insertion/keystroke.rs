use thiserror::Error;

/// Paste keystroke failures
#[derive(Debug, Error)]
pub enum KeystrokeError {
    /// The synthetic key sequence could not be produced
    #[error("failed to synthesize paste keystroke: {0}")]
    Synthesis(String),
}

/// Gap between the individual key events of the paste chord
///
/// Some applications and input methods need a small gap between the
/// modifier and key events to register the chord correctly.
const KEY_EVENT_DELAY: std::time::Duration = std::time::Duration::from_millis(10);

/// Synthesizes the platform paste chord at the current input focus
pub trait PasteKeys: Send + Sync {
    /// Whether the input-simulation capability is currently granted
    fn available(&self) -> bool;

    /// Posts the paste chord as an explicit modifier-down, key-down,
    /// key-up, modifier-up sequence
    ///
    /// # Errors
    /// Returns error if any event in the sequence cannot be produced
    fn send_paste(&self) -> Result<(), KeystrokeError>;
}

/// Platform implementation of [`PasteKeys`]
pub struct SystemPasteKeys;

impl SystemPasteKeys {
    /// Creates the platform paste synthesizer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for SystemPasteKeys {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "macos")]
impl PasteKeys for SystemPasteKeys {
    fn available(&self) -> bool {
        crate::permissions::input_simulation_granted()
    }

    fn send_paste(&self) -> Result<(), KeystrokeError> {
        use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation};
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        const KEY_COMMAND: u16 = 0x37;
        const KEY_V: u16 = 0x09;

        // Events posted from a HID-state source get the system's local
        // event suppression interval, so concurrent physical keystrokes
        // cannot interleave with the chord.
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState).map_err(|()| {
            KeystrokeError::Synthesis("could not create CGEvent source".to_owned())
        })?;

        let key_event = |keycode: u16, down: bool, flags: Option<CGEventFlags>| {
            let event = CGEvent::new_keyboard_event(source.clone(), keycode, down)
                .map_err(|()| KeystrokeError::Synthesis("could not create key event".to_owned()))?;
            if let Some(flags) = flags {
                event.set_flags(flags);
            }
            event.post(CGEventTapLocation::HID);
            std::thread::sleep(KEY_EVENT_DELAY);
            Ok::<(), KeystrokeError>(())
        };

        key_event(KEY_COMMAND, true, Some(CGEventFlags::CGEventFlagCommand))?;
        key_event(KEY_V, true, Some(CGEventFlags::CGEventFlagCommand))?;
        key_event(KEY_V, false, Some(CGEventFlags::CGEventFlagCommand))?;
        key_event(KEY_COMMAND, false, None)?;

        tracing::debug!("paste chord posted");
        Ok(())
    }
}

#[cfg(not(target_os = "macos"))]
impl PasteKeys for SystemPasteKeys {
    fn available(&self) -> bool {
        crate::permissions::input_simulation_granted()
    }

    fn send_paste(&self) -> Result<(), KeystrokeError> {
        use enigo::{Direction, Enigo, Key, Keyboard, Settings};

        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| KeystrokeError::Synthesis(e.to_string()))?;

        enigo
            .key(Key::Control, Direction::Press)
            .map_err(|e| KeystrokeError::Synthesis(e.to_string()))?;
        std::thread::sleep(KEY_EVENT_DELAY);

        let click = enigo.key(Key::Unicode('v'), Direction::Click);
        std::thread::sleep(KEY_EVENT_DELAY);

        // Release Ctrl even when the click failed; a stuck modifier
        // makes the whole keyboard unusable.
        let release = enigo.key(Key::Control, Direction::Release);

        click.map_err(|e| KeystrokeError::Synthesis(e.to_string()))?;
        release.map_err(|e| KeystrokeError::Synthesis(e.to_string()))?;

        tracing::debug!("paste chord posted");
        Ok(())
    }
}
