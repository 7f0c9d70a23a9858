/// Push-to-talk and cancel key registration
pub mod hotkey;

pub use hotkey::HotkeyListener;
