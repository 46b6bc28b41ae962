//! One paper in, one summary out.
//!
//! The assistant streams its answer token by token and exposes no "done"
//! event, so completion is inferred from the rendered text itself:
//!
//! ```text
//! Uploading ──▶ Awaiting-button ──▶ Stabilizing ──▶ Extracting
//!  (timeout:      (timeout:           (idle AND          (clipboard,
//!   warn only)     fatal)              min-time, or       else rendered
//!                                      max-wait)          text)
//! ```
//!
//! Stabilization declares the answer complete once at least
//! `min_output_secs` have passed since the copy affordance appeared AND the
//! text has not changed for `idle_secs`. `max_wait_secs` ends the loop
//! regardless, so a submission never hangs.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

use crate::clipboard::ClipboardReader;
use crate::config::{AssistantConfig, SelectorConfig, TimingConfig};
use crate::error::DigestError;
use crate::models::Artifact;
use crate::surface::InteractiveSurface;

/// Why the stabilization loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Text was quiet for the idle window after the minimum output time.
    Idle,
    /// The hard limit was reached first.
    MaxWait,
}

#[derive(Debug, Clone)]
pub struct Stabilized {
    pub text: String,
    pub completion: Completion,
    pub elapsed: Duration,
}

pub struct Submitter {
    prompt: String,
    timing: TimingConfig,
    selectors: SelectorConfig,
}

impl Submitter {
    pub fn new(assistant: &AssistantConfig, timing: &TimingConfig, selectors: &SelectorConfig) -> Self {
        Self {
            prompt: assistant.prompt.clone(),
            timing: timing.clone(),
            selectors: selectors.clone(),
        }
    }

    /// Upload `artifact`, ask for the summary, and return the final answer.
    ///
    /// # Errors
    ///
    /// - [`DigestError::ResponseTimeout`] if the copy affordance never shows.
    /// - [`DigestError::EmptyResponse`] if no text could be extracted.
    /// - Any error attaching the file or typing the prompt.
    pub async fn submit<S, C>(&self, surface: &S, clipboard: &C, artifact: &Artifact) -> Result<String>
    where
        S: InteractiveSurface + ?Sized,
        C: ClipboardReader + ?Sized,
    {
        self.upload(surface, &artifact.path).await?;

        surface
            .fill(&self.selectors.prompt_input, &self.prompt)
            .await?;
        surface
            .press_key(&self.selectors.prompt_input, "Enter")
            .await?;
        tracing::info!(paper_id = %artifact.id, "summary request sent");

        self.await_response(surface).await?;
        tracing::info!(paper_id = %artifact.id, "copy button detected, watching answer");

        let stabilized = self.stabilize(surface).await;
        tracing::debug!(
            paper_id = %artifact.id,
            completion = ?stabilized.completion,
            elapsed_s = stabilized.elapsed.as_secs(),
            chars = stabilized.text.chars().count(),
            "answer settled"
        );

        let text = match self.copy_via_clipboard(surface, clipboard).await {
            Some(copied) => {
                tracing::info!(paper_id = %artifact.id, "using clipboard copy of the answer");
                copied
            }
            None => stabilized.text,
        };

        if text.trim().is_empty() {
            return Err(DigestError::EmptyResponse.into());
        }
        Ok(text)
    }

    /// Attach the file and wait (non-fatally) for the upload indicator.
    async fn upload<S>(&self, surface: &S, path: &Path) -> Result<()>
    where
        S: InteractiveSurface + ?Sized,
    {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        tracing::info!(file = %name, "uploading");
        surface
            .set_input_files(&self.selectors.file_input, path)
            .await?;

        let timeout = self.timing.upload_timeout();
        let started = Instant::now();
        loop {
            if self.upload_indicator_present(surface).await {
                tracing::info!(file = %name, "upload complete");
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= timeout {
                tracing::warn!(
                    file = %name,
                    waited_s = waited.as_secs(),
                    "upload indicator not seen, continuing"
                );
                return Ok(());
            }
            tokio::time::sleep(self.timing.poll_interval().min(timeout - waited)).await;
        }
    }

    async fn upload_indicator_present<S>(&self, surface: &S) -> bool
    where
        S: InteractiveSurface + ?Sized,
    {
        for selector in &self.selectors.upload_done {
            if surface.exists(selector).await.unwrap_or(false) {
                return true;
            }
        }
        match &self.selectors.upload_done_text {
            Some(marker) => surface.has_text(marker).await.unwrap_or(false),
            None => false,
        }
    }

    async fn await_response<S>(&self, surface: &S) -> Result<()>
    where
        S: InteractiveSurface + ?Sized,
    {
        let timeout = self.timing.response_timeout();
        surface
            .wait_for_selector(&self.selectors.copy_button, timeout, self.timing.poll_interval())
            .await
            .map_err(|_| DigestError::ResponseTimeout { waited: timeout }.into())
    }

    /// Poll the rendered answer until it is judged complete.
    pub async fn stabilize<S>(&self, surface: &S) -> Stabilized
    where
        S: InteractiveSurface + ?Sized,
    {
        let idle = self.timing.idle();
        let min_output = self.timing.min_output();
        let max_wait = self.timing.max_wait();

        let started = Instant::now();
        let mut last_text = String::new();
        let mut last_change = started;

        loop {
            let current = self.read_answer(surface).await;
            if !current.is_empty() && current != last_text {
                last_text = current;
                last_change = Instant::now();
            }

            let now = Instant::now();
            let elapsed = now - started;
            if elapsed >= min_output && now - last_change >= idle {
                return Stabilized {
                    text: last_text,
                    completion: Completion::Idle,
                    elapsed,
                };
            }
            if elapsed >= max_wait {
                tracing::warn!(waited_s = elapsed.as_secs(), "max wait reached, taking answer as is");
                return Stabilized {
                    text: last_text,
                    completion: Completion::MaxWait,
                    elapsed,
                };
            }
            tokio::time::sleep(self.timing.poll_interval()).await;
        }
    }

    /// Rendered answer text; blank on any read failure.
    async fn read_answer<S>(&self, surface: &S) -> String
    where
        S: InteractiveSurface + ?Sized,
    {
        match surface.inner_texts(&self.selectors.answer).await {
            Ok(texts) => texts
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read answer");
                String::new()
            }
        }
    }

    /// Click the copy affordance and read the clipboard. `None` on any failure
    /// or blank content.
    async fn copy_via_clipboard<S, C>(&self, surface: &S, clipboard: &C) -> Option<String>
    where
        S: InteractiveSurface + ?Sized,
        C: ClipboardReader + ?Sized,
    {
        if !clipboard.clear() {
            tracing::debug!("could not clear clipboard before copying");
        }
        if let Err(e) = surface
            .click(&self.selectors.copy_button, self.timing.copy_click_timeout())
            .await
        {
            tracing::warn!(error = %e, "copy button failed");
            return None;
        }
        tokio::time::sleep(self.timing.clipboard_settle()).await;

        clipboard.read().filter(|text| !text.trim().is_empty())
    }
}
