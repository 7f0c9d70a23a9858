use anyhow::{anyhow, Context, Result};
use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::HotkeyConfig;
use crate::session::SessionEvent;

/// Translates global hotkey activity into session events
///
/// The push-to-talk chord maps press to `HotkeyPressed` and release to
/// `StopRecording`. The cancel key (Escape) is registered only while
/// the session UI is visible, so it never shadows Escape for other
/// applications; while armed it maps to `EscapePressed`. What each
/// event means in the current state is the state machine's business,
/// not this layer's.
pub struct HotkeyListener {
    manager: GlobalHotKeyManager,
    push_to_talk: HotKey,
    cancel: HotKey,
    cancel_armed: bool,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl HotkeyListener {
    /// Registers the configured push-to-talk chord
    ///
    /// # Errors
    /// Returns error when the chord cannot be parsed or registered
    pub fn new(
        config: &HotkeyConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        let manager = GlobalHotKeyManager::new().context("failed to create hotkey manager")?;

        let modifiers = parse_modifiers(&config.modifiers)?;
        let code = parse_key(&config.key)?;

        let push_to_talk = HotKey::new(Some(modifiers), code);
        manager
            .register(push_to_talk)
            .context("failed to register push-to-talk hotkey")?;

        info!(modifiers = ?config.modifiers, key = %config.key, "push-to-talk registered");

        Ok(Self {
            manager,
            push_to_talk,
            cancel: HotKey::new(None, Code::Escape),
            cancel_armed: false,
            events,
        })
    }

    /// Arms or disarms the cancel key as the session UI shows and hides
    pub fn set_session_visible(&mut self, visible: bool) {
        if visible == self.cancel_armed {
            return;
        }

        let result = if visible {
            self.manager.register(self.cancel)
        } else {
            self.manager.unregister(self.cancel)
        };

        match result {
            Ok(()) => {
                self.cancel_armed = visible;
                debug!(armed = visible, "cancel key");
            }
            Err(e) => warn!(%e, armed = visible, "cancel key registration change failed"),
        }
    }

    /// Routes one global hotkey event into the session channel
    pub fn handle_event(&self, event: &GlobalHotKeyEvent) {
        if event.id == self.push_to_talk.id() {
            let session_event = match event.state {
                HotKeyState::Pressed => SessionEvent::HotkeyPressed,
                HotKeyState::Released => SessionEvent::StopRecording,
            };
            let _ = self.events.send(session_event);
        } else if event.id == self.cancel.id() {
            if matches!(event.state, HotKeyState::Pressed) {
                let _ = self.events.send(SessionEvent::EscapePressed);
            }
        }
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        if let Err(e) = self.manager.unregister(self.push_to_talk) {
            tracing::error!("failed to unregister push-to-talk: {e}");
        }
        if self.cancel_armed {
            if let Err(e) = self.manager.unregister(self.cancel) {
                tracing::error!("failed to unregister cancel key: {e}");
            }
        }
    }
}

fn parse_modifiers(modifiers: &[String]) -> Result<Modifiers> {
    let mut result = Modifiers::empty();
    for modifier in modifiers {
        match modifier.as_str() {
            "Control" | "Ctrl" => result |= Modifiers::CONTROL,
            "Option" | "Alt" => result |= Modifiers::ALT,
            "Command" | "Super" => result |= Modifiers::SUPER,
            "Shift" => result |= Modifiers::SHIFT,
            _ => return Err(anyhow!("unknown modifier: {}", modifier)),
        }
    }
    Ok(result)
}

fn parse_key(key: &str) -> Result<Code> {
    match key {
        "A" => Ok(Code::KeyA),
        "B" => Ok(Code::KeyB),
        "C" => Ok(Code::KeyC),
        "D" => Ok(Code::KeyD),
        "E" => Ok(Code::KeyE),
        "F" => Ok(Code::KeyF),
        "G" => Ok(Code::KeyG),
        "H" => Ok(Code::KeyH),
        "I" => Ok(Code::KeyI),
        "J" => Ok(Code::KeyJ),
        "K" => Ok(Code::KeyK),
        "L" => Ok(Code::KeyL),
        "M" => Ok(Code::KeyM),
        "N" => Ok(Code::KeyN),
        "O" => Ok(Code::KeyO),
        "P" => Ok(Code::KeyP),
        "Q" => Ok(Code::KeyQ),
        "R" => Ok(Code::KeyR),
        "S" => Ok(Code::KeyS),
        "T" => Ok(Code::KeyT),
        "U" => Ok(Code::KeyU),
        "V" => Ok(Code::KeyV),
        "W" => Ok(Code::KeyW),
        "X" => Ok(Code::KeyX),
        "Y" => Ok(Code::KeyY),
        "Z" => Ok(Code::KeyZ),
        _ => Err(anyhow!("unsupported key: {}", key)),
    }
}
