//! Narrow capability interfaces over a scripted browser page.
//!
//! Core logic (session bootstrap, submission, orchestration) depends only on
//! these traits. [`crate::browser::ChromeSession`] binds them to Chromium;
//! tests bind them to scripted fakes.
//!
//! ```text
//! Navigable            goto
//! InteractiveSurface   set files, fill, key, click, read text, wait, screenshot
//! SessionContainer     export session state, close
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::DigestError;
use crate::session::SessionState;

/// Something that can be pointed at a URL.
#[async_trait]
pub trait Navigable: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;
}

/// The page surface a submission drives.
///
/// Every method acts on the first element matching `selector` unless noted.
#[async_trait]
pub trait InteractiveSurface: Send + Sync {
    /// Attach a local file to a file input.
    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()>;

    /// Replace the contents of a text field.
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    /// Send a single key (e.g. `"Enter"`) to the element.
    async fn press_key(&self, selector: &str, key: &str) -> Result<()>;

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Click the first clickable element whose visible text contains `label`.
    /// `Ok(false)` when nothing matched.
    async fn click_text(&self, label: &str, timeout: Duration) -> Result<bool>;

    /// Rendered text of every element matching `selector`, in document order.
    async fn inner_texts(&self, selector: &str) -> Result<Vec<String>>;

    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Whether the page's visible text contains `marker`.
    async fn has_text(&self, marker: &str) -> Result<bool>;

    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<()>;

    /// Poll [`exists`](InteractiveSurface::exists) until it holds or `timeout`
    /// expires. Read errors count as "not there yet".
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.exists(selector).await.unwrap_or(false) {
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(DigestError::SelectorTimeout {
                    selector: selector.to_string(),
                    waited,
                }
                .into());
            }
            tokio::time::sleep(poll.min(timeout - waited)).await;
        }
    }
}

/// Owner of the authenticated browser state.
#[async_trait]
pub trait SessionContainer: Send + Sync {
    /// Serializable snapshot of the session (cookies).
    async fn storage_state(&self) -> Result<SessionState>;

    async fn close(&mut self) -> Result<()>;
}

/// Everything one pipeline iteration needs from a page.
pub trait AssistantPage: Navigable + InteractiveSurface + SessionContainer {}

impl<T: Navigable + InteractiveSurface + SessionContainer> AssistantPage for T {}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::SelectorConfig;
    use std::sync::{Arc, Mutex};

    pub type AnswerScript = Box<dyn Fn(Duration) -> String + Send + Sync>;

    /// Scripted page: the answer text is a function of time since creation.
    pub struct FakeSurface {
        started: Instant,
        selectors: SelectorConfig,
        pub upload_indicator: bool,
        /// `None` means the copy affordance never shows up.
        pub copy_button_after: Option<Duration>,
        pub answer: AnswerScript,
        /// Written to `clipboard` when the copy affordance is clicked.
        pub copy_payload: Option<String>,
        pub clipboard: Arc<Mutex<Option<String>>>,
        pub fail_screenshot: bool,
        pub calls: Mutex<Vec<String>>,
        pub closed: Arc<Mutex<bool>>,
    }

    impl FakeSurface {
        pub fn new(selectors: &SelectorConfig) -> Self {
            Self {
                started: Instant::now(),
                selectors: selectors.clone(),
                upload_indicator: true,
                copy_button_after: Some(Duration::from_secs(2)),
                answer: Box::new(|_| String::new()),
                copy_payload: None,
                clipboard: Arc::new(Mutex::new(None)),
                fail_screenshot: false,
                calls: Mutex::new(Vec::new()),
                closed: Arc::new(Mutex::new(false)),
            }
        }

        pub fn with_answer(
            mut self,
            answer: impl Fn(Duration) -> String + Send + Sync + 'static,
        ) -> Self {
            self.answer = Box::new(answer);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn copy_visible(&self) -> bool {
            self.copy_button_after
                .map(|after| self.started.elapsed() >= after)
                .unwrap_or(false)
        }
    }

    #[async_trait]
    impl Navigable for FakeSurface {
        async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
            self.record(format!("goto {}", url));
            Ok(())
        }
    }

    #[async_trait]
    impl InteractiveSurface for FakeSurface {
        async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()> {
            self.record(format!("upload {} {}", selector, path.display()));
            Ok(())
        }

        async fn fill(&self, selector: &str, text: &str) -> Result<()> {
            self.record(format!("fill {} {}", selector, text));
            Ok(())
        }

        async fn press_key(&self, selector: &str, key: &str) -> Result<()> {
            self.record(format!("key {} {}", selector, key));
            Ok(())
        }

        async fn click(&self, selector: &str, _timeout: Duration) -> Result<()> {
            self.record(format!("click {}", selector));
            if selector == self.selectors.copy_button {
                if !self.copy_visible() {
                    anyhow::bail!("copy button not present");
                }
                if let Some(payload) = &self.copy_payload {
                    *self.clipboard.lock().unwrap() = Some(payload.clone());
                }
            }
            Ok(())
        }

        async fn click_text(&self, label: &str, _timeout: Duration) -> Result<bool> {
            self.record(format!("click_text {}", label));
            Ok(label == "Accept all")
        }

        async fn inner_texts(&self, selector: &str) -> Result<Vec<String>> {
            if selector != self.selectors.answer {
                return Ok(Vec::new());
            }
            let text = (self.answer)(self.started.elapsed());
            Ok(vec![text])
        }

        async fn exists(&self, selector: &str) -> Result<bool> {
            if selector == self.selectors.copy_button {
                return Ok(self.copy_visible());
            }
            if self.selectors.upload_done.iter().any(|s| s == selector) {
                return Ok(self.upload_indicator);
            }
            Ok(false)
        }

        async fn has_text(&self, _marker: &str) -> Result<bool> {
            Ok(false)
        }

        async fn screenshot(&self, path: &Path, _full_page: bool) -> Result<()> {
            if self.fail_screenshot {
                anyhow::bail!("target closed");
            }
            std::fs::write(path, b"\x89PNG")?;
            Ok(())
        }
    }

    #[async_trait]
    impl SessionContainer for FakeSurface {
        async fn storage_state(&self) -> Result<SessionState> {
            Ok(SessionState::default())
        }

        async fn close(&mut self) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }
}
