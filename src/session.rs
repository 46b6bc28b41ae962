//! Authenticated assistant sessions.
//!
//! Logging in is interactive and happens once, out of band
//! (`pdigest --init-auth`): a visible browser opens the assistant, obvious
//! consent dialogs are dismissed, the operator finishes the login by hand and
//! confirms on the terminal, and the resulting cookies are written to the
//! session file. Every later run restores those cookies into a fresh browser,
//! one browser per paper.
//!
//! Expiry is not detected. When the saved login stops working, submissions
//! fail and the operator runs `--init-auth` again.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::ChromeSession;
use crate::config::{AssistantConfig, Config};
use crate::error::DigestError;
use crate::pipeline::SessionFactory;
use crate::surface::{InteractiveSurface, Navigable, SessionContainer};

/// Serialized login material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Seconds since the epoch; `None` for session cookies.
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

impl SessionState {
    /// Read the session file. A missing file is [`DigestError::MissingSession`].
    pub fn load(path: &Path) -> Result<Self> {
        ensure_session_file(path)?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        let state = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))?;
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        Ok(())
    }
}

pub fn ensure_session_file(path: &Path) -> Result<(), DigestError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(DigestError::MissingSession {
            path: path.to_path_buf(),
        })
    }
}

/// Click the first consent button whose text matches one of `labels`.
///
/// Labels are tried in order and the first successful click wins. Errors and
/// timeouts are ignored; `None` means nothing was clicked.
pub async fn dismiss_consent<S>(surface: &S, labels: &[String], timeout: Duration) -> Option<String>
where
    S: InteractiveSurface + ?Sized,
{
    for label in labels {
        match surface.click_text(label, timeout).await {
            Ok(true) => return Some(label.clone()),
            Ok(false) => {}
            Err(e) => tracing::debug!(label = %label, error = %e, "consent click failed"),
        }
    }
    None
}

/// Interactive login. Saves the session file for later runs.
pub async fn init_auth(config: &Config) -> Result<()> {
    let assistant = &config.assistant;
    let path = &config.paths.session_file;

    tracing::info!(url = %assistant.base_url, "opening assistant, please log in");
    let mut session = ChromeSession::launch(assistant, false).await?;

    let result = async {
        session
            .goto(&assistant.base_url, assistant.navigation_timeout())
            .await?;

        if let Some(label) = dismiss_consent(
            &session,
            &config.session.consent_labels,
            config.session.consent_click_timeout(),
        )
        .await
        {
            tracing::info!(label = %label, "dismissed consent dialog");
        }

        wait_for_operator().await?;

        let mut state = session.storage_state().await?;
        state.saved_at = Some(Utc::now());
        state.save(path)?;
        tracing::info!(path = %path.display(), cookies = state.cookies.len(), "session saved");
        Ok::<_, anyhow::Error>(())
    }
    .await;

    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "failed to close browser");
    }
    result
}

async fn wait_for_operator() -> Result<()> {
    tokio::task::spawn_blocking(|| -> Result<()> {
        print!("\nFinish logging in in the browser and open a conversation, then press Enter to continue...");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(())
    })
    .await
    .context("operator prompt task failed")?
}

/// Opens a fresh Chromium per paper with the saved cookies restored.
pub struct ChromeSessionFactory {
    assistant: AssistantConfig,
    state_path: PathBuf,
}

impl ChromeSessionFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            assistant: config.assistant.clone(),
            state_path: config.paths.session_file.clone(),
        }
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    type Session = ChromeSession;

    async fn open(&self) -> Result<ChromeSession> {
        let state = SessionState::load(&self.state_path)?;
        let mut session = ChromeSession::launch(&self.assistant, self.assistant.headless).await?;

        let ready = async {
            session.restore(&state).await?;
            session
                .goto(&self.assistant.base_url, self.assistant.navigation_timeout())
                .await
        }
        .await;

        match ready {
            Ok(()) => Ok(session),
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    tracing::debug!(error = %close_err, "failed to close browser after setup error");
                }
                Err(e)
            }
        }
    }
}
