//! Best-effort access to the system clipboard.
//!
//! The assistant's copy affordance puts the answer (with formulas intact) on
//! the OS clipboard. Reading it back is opportunistic: any failure is `None`
//! and the caller falls back to the rendered text.

/// Clipboard seen by the submitter.
pub trait ClipboardReader: Send + Sync {
    /// Empty the clipboard so a later read cannot return stale content.
    /// Returns `false` if that was not possible.
    fn clear(&self) -> bool;

    /// Current text content, if any could be read.
    fn read(&self) -> Option<String>;
}

/// The OS clipboard via `arboard`. Opens a fresh handle per call.
pub struct SystemClipboard;

impl ClipboardReader for SystemClipboard {
    fn clear(&self) -> bool {
        match arboard::Clipboard::new().and_then(|mut c| c.set_text(String::new())) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "clipboard clear failed");
                false
            }
        }
    }

    fn read(&self) -> Option<String> {
        match arboard::Clipboard::new().and_then(|mut c| c.get_text()) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::debug!(error = %e, "clipboard read failed");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Clipboard shared with a `FakeSurface`, which writes to it on copy.
    pub struct FakeClipboard {
        pub content: Arc<Mutex<Option<String>>>,
        pub clearable: bool,
    }

    impl FakeClipboard {
        pub fn new(content: Arc<Mutex<Option<String>>>) -> Self {
            Self {
                content,
                clearable: true,
            }
        }
    }

    impl ClipboardReader for FakeClipboard {
        fn clear(&self) -> bool {
            if self.clearable {
                *self.content.lock().unwrap() = None;
            }
            self.clearable
        }

        fn read(&self) -> Option<String> {
            self.content.lock().unwrap().clone()
        }
    }
}
