/// Paste keystroke synthesis
pub mod keystroke;
/// Clipboard access and snapshot/restore
pub mod pasteboard;
/// The write-verify-paste-restore protocol
pub mod protocol;

pub use protocol::{InsertOutcome, TextInserter};
