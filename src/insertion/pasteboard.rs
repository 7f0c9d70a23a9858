use thiserror::Error;

/// Clipboard access failures
#[derive(Debug, Error)]
pub enum PasteboardError {
    /// The system clipboard could not be opened
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    /// A write was rejected by the clipboard
    #[error("clipboard write failed: {0}")]
    WriteFailed(String),
}

/// Complete prior clipboard content across all formats
///
/// Each item is a list of (format identifier, raw data) representations
/// so rich content (images, files, styled text) survives a
/// snapshot/restore round trip, not just the plain-text slot.
#[derive(Debug, Clone, Default)]
pub struct PasteboardSnapshot {
    items: Vec<Vec<(String, Vec<u8>)>>,
}

impl PasteboardSnapshot {
    /// Wraps captured item representations
    #[must_use]
    pub fn new(items: Vec<Vec<(String, Vec<u8>)>>) -> Self {
        Self { items }
    }

    /// Captured items, outermost to innermost
    #[must_use]
    pub fn items(&self) -> &[Vec<(String, Vec<u8>)>] {
        &self.items
    }

    /// Whether the clipboard held nothing at capture time
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// System clipboard with a revision counter
///
/// `change_count` must advance whenever the clipboard content changes,
/// including changes made by other processes; the insertion protocol
/// polls it to confirm that a write actually committed.
pub trait Pasteboard: Send {
    /// Current revision counter
    fn change_count(&mut self) -> i64;

    /// Plain-text content, if any
    fn read_text(&mut self) -> Option<String>;

    /// Replaces the clipboard with plain text
    ///
    /// # Errors
    /// Returns error if the clipboard rejects the write
    fn write_text(&mut self, text: &str) -> Result<(), PasteboardError>;

    /// Captures the complete current content across all formats
    fn snapshot(&mut self) -> PasteboardSnapshot;

    /// Replaces the clipboard with previously captured content
    ///
    /// # Errors
    /// Returns error if the clipboard rejects the restore
    fn restore(&mut self, snapshot: &PasteboardSnapshot) -> Result<(), PasteboardError>;
}

/// Opens the platform clipboard
///
/// # Errors
/// Returns error if no clipboard is available (e.g. headless session)
pub fn system_pasteboard() -> Result<Box<dyn Pasteboard>, PasteboardError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(macos::MacPasteboard::new()))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Ok(Box::new(portable::PortablePasteboard::new()?))
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use super::{Pasteboard, PasteboardError, PasteboardSnapshot};
    use objc2::rc::Retained;
    use objc2::runtime::ProtocolObject;
    use objc2_app_kit::{NSPasteboard, NSPasteboardItem, NSPasteboardTypeString, NSPasteboardWriting};
    use objc2_foundation::{NSArray, NSData, NSString};

    /// NSPasteboard-backed implementation
    ///
    /// The general pasteboard is fetched per call; holding it across
    /// calls is not required and the object is process-global anyway.
    pub struct MacPasteboard;

    impl MacPasteboard {
        pub const fn new() -> Self {
            Self
        }

        #[allow(unsafe_code)]
        fn general() -> Retained<NSPasteboard> {
            unsafe { NSPasteboard::generalPasteboard() }
        }
    }

    impl Pasteboard for MacPasteboard {
        #[allow(unsafe_code)]
        fn change_count(&mut self) -> i64 {
            Self::general().changeCount() as i64
        }

        #[allow(unsafe_code)]
        fn read_text(&mut self) -> Option<String> {
            let pasteboard = Self::general();
            let string = unsafe { pasteboard.stringForType(NSPasteboardTypeString) }?;
            Some(string.to_string())
        }

        #[allow(unsafe_code)]
        fn write_text(&mut self, text: &str) -> Result<(), PasteboardError> {
            let pasteboard = Self::general();
            unsafe { pasteboard.clearContents() };
            let ok = unsafe {
                pasteboard.setString_forType(&NSString::from_str(text), NSPasteboardTypeString)
            };
            if ok {
                Ok(())
            } else {
                Err(PasteboardError::WriteFailed(
                    "NSPasteboard rejected the string".to_owned(),
                ))
            }
        }

        #[allow(unsafe_code)]
        fn snapshot(&mut self) -> PasteboardSnapshot {
            let pasteboard = Self::general();
            let mut items = Vec::new();

            if let Some(pasteboard_items) = unsafe { pasteboard.pasteboardItems() } {
                for item in &pasteboard_items {
                    let mut representations = Vec::new();
                    let types = unsafe { item.types() };
                    for data_type in &types {
                        if let Some(data) = unsafe { item.dataForType(&data_type) } {
                            representations.push((data_type.to_string(), data.bytes().to_vec()));
                        }
                    }
                    if !representations.is_empty() {
                        items.push(representations);
                    }
                }
            }

            PasteboardSnapshot::new(items)
        }

        #[allow(unsafe_code)]
        fn restore(&mut self, snapshot: &PasteboardSnapshot) -> Result<(), PasteboardError> {
            let pasteboard = Self::general();
            unsafe { pasteboard.clearContents() };

            if snapshot.is_empty() {
                return Ok(());
            }

            let mut writers: Vec<Retained<ProtocolObject<dyn NSPasteboardWriting>>> = Vec::new();
            for representations in snapshot.items() {
                let item = NSPasteboardItem::new();
                for (data_type, bytes) in representations {
                    let ok = unsafe {
                        item.setData_forType(
                            &NSData::with_bytes(bytes),
                            &NSString::from_str(data_type),
                        )
                    };
                    if !ok {
                        return Err(PasteboardError::WriteFailed(format!(
                            "could not restore representation {data_type}"
                        )));
                    }
                }
                writers.push(ProtocolObject::from_retained(item));
            }

            let array = NSArray::from_retained_slice(&writers);
            let ok = unsafe { pasteboard.writeObjects(&array) };
            if ok {
                Ok(())
            } else {
                Err(PasteboardError::WriteFailed(
                    "NSPasteboard rejected restored items".to_owned(),
                ))
            }
        }
    }
}

#[cfg(not(target_os = "macos"))]
mod portable {
    use super::{Pasteboard, PasteboardError, PasteboardSnapshot};
    use arboard::Clipboard;

    const TEXT_FORMAT: &str = "public.utf8-plain-text";

    /// arboard-backed implementation for non-macOS desktops
    ///
    /// arboard has no native revision counter, so one is emulated:
    /// every observed content change advances `revision`. Snapshots
    /// cover the plain-text slot, which is what arboard exposes.
    pub struct PortablePasteboard {
        clipboard: Clipboard,
        revision: i64,
        last_seen: Option<String>,
    }

    impl PortablePasteboard {
        pub fn new() -> Result<Self, PasteboardError> {
            let clipboard =
                Clipboard::new().map_err(|e| PasteboardError::Unavailable(e.to_string()))?;
            Ok(Self {
                clipboard,
                revision: 0,
                last_seen: None,
            })
        }

        fn observe(&mut self) -> Option<String> {
            let current = self.clipboard.get_text().ok();
            if current != self.last_seen {
                self.revision += 1;
                self.last_seen.clone_from(&current);
            }
            current
        }
    }

    impl Pasteboard for PortablePasteboard {
        fn change_count(&mut self) -> i64 {
            self.observe();
            self.revision
        }

        fn read_text(&mut self) -> Option<String> {
            self.observe()
        }

        fn write_text(&mut self, text: &str) -> Result<(), PasteboardError> {
            self.clipboard
                .set_text(text)
                .map_err(|e| PasteboardError::WriteFailed(e.to_string()))
        }

        fn snapshot(&mut self) -> PasteboardSnapshot {
            match self.observe() {
                Some(text) => PasteboardSnapshot::new(vec![vec![(
                    TEXT_FORMAT.to_owned(),
                    text.into_bytes(),
                )]]),
                None => PasteboardSnapshot::default(),
            }
        }

        fn restore(&mut self, snapshot: &PasteboardSnapshot) -> Result<(), PasteboardError> {
            let text = snapshot.items().iter().flatten().find_map(|(format, bytes)| {
                if format == TEXT_FORMAT {
                    String::from_utf8(bytes.clone()).ok()
                } else {
                    None
                }
            });

            match text {
                Some(text) => self
                    .clipboard
                    .set_text(text)
                    .map_err(|e| PasteboardError::WriteFailed(e.to_string())),
                None => self
                    .clipboard
                    .clear()
                    .map_err(|e| PasteboardError::WriteFailed(e.to_string())),
            }
        }
    }
}
