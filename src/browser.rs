//! Chromium binding of the page capabilities.
//!
//! Drives a real browser over the DevTools protocol with `chromiumoxide`.
//! One [`ChromeSession`] owns one browser process and a single page; it is
//! created per paper and closed afterwards.
//!
//! DOM reads go through small `Runtime.evaluate` snippets. Selectors and
//! labels are embedded as JSON string literals, which are valid JavaScript.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::AssistantConfig;
use crate::session::{SessionState, StoredCookie};
use crate::surface::{InteractiveSurface, Navigable, SessionContainer};

/// Elements a consent label may live on.
const CLICKABLE: &str =
    r#"button, a, [role="button"], input[type="button"], input[type="submit"]"#;

pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    closed: bool,
}

impl ChromeSession {
    /// Launch Chromium and open a blank page.
    pub async fn launch(config: &AssistantConfig, headless: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder().request_timeout(config.navigation_timeout());
        if !headless {
            builder = builder.with_head();
        }
        if let Some(exe) = &config.chrome_executable {
            builder = builder.chrome_executable(exe);
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow!("Invalid browser configuration: {}", e))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(e).context("Failed to open browser page");
            }
        };

        tracing::debug!(headless, "browser launched");
        Ok(Self {
            browser,
            page,
            handler,
            closed: false,
        })
    }

    /// Install saved cookies browser-wide. Call before navigating to the
    /// assistant; the blank start page cannot hold cookies itself.
    pub async fn restore(&self, state: &SessionState) -> Result<()> {
        let cookies: Vec<CookieParam> = state.cookies.iter().map(to_cookie_param).collect();
        if cookies.is_empty() {
            tracing::warn!("session file holds no cookies");
            return Ok(());
        }
        let count = cookies.len();
        self.browser
            .set_cookies(cookies)
            .await
            .context("Failed to restore session cookies")?;
        tracing::debug!(cookies = count, "session restored");
        Ok(())
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self.page.evaluate(script).await?;
        Ok(result.into_value::<T>()?)
    }
}

fn to_cookie_param(cookie: &StoredCookie) -> CookieParam {
    let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
    param.domain = Some(cookie.domain.clone());
    param.path = Some(cookie.path.clone());
    param.secure = Some(cookie.secure);
    param.http_only = Some(cookie.http_only);
    param.expires = cookie.expires.map(TimeSinceEpoch::new);
    param
}

/// Expiry as stored on disk; session cookies carry none.
fn stored_expiry(session: bool, expires: f64) -> Option<f64> {
    if session || expires <= 0.0 {
        None
    } else {
        Some(expires)
    }
}

fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl Navigable for ChromeSession {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| anyhow!("Navigation to {} timed out after {}s", url, timeout.as_secs()))?
            .with_context(|| format!("Failed to navigate to {}", url))?;
        Ok(())
    }
}

#[async_trait]
impl InteractiveSurface for ChromeSession {
    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()> {
        let absolute = std::fs::canonicalize(path)
            .with_context(|| format!("File to upload not found: {}", path.display()))?;
        let input = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("File input `{}` not found", selector))?;

        let mut params = SetFileInputFilesParams::new(vec![absolute.to_string_lossy().to_string()]);
        params.backend_node_id = Some(input.backend_node_id.clone());
        self.page
            .execute(params)
            .await
            .context("Failed to attach file")?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let focused: bool = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({}); if (!el) return false; \
                 el.focus(); if (typeof el.select === 'function') el.select(); return true; }})()",
                js_str(selector)
            ))
            .await?;
        if !focused {
            bail!("Text field `{}` not found", selector);
        }
        // Inserted like IME input so framework-controlled fields see the change.
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .context("Failed to type prompt")?;
        Ok(())
    }

    async fn press_key(&self, selector: &str, key: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("Element `{}` not found", selector))?;
        element
            .press_key(key)
            .await
            .with_context(|| format!("Failed to press {}", key))?;
        Ok(())
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, async {
            let element = self.page.find_element(selector).await?;
            element.click().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await
        .map_err(|_| anyhow!("Click on `{}` timed out", selector))?
        .with_context(|| format!("Failed to click `{}`", selector))?;
        Ok(())
    }

    async fn click_text(&self, label: &str, timeout: Duration) -> Result<bool> {
        let script = format!(
            "(() => {{ const label = {}; \
             const hit = Array.from(document.querySelectorAll({})) \
               .find(n => ((n.innerText || n.value || '') + '').includes(label)); \
             if (!hit) return false; hit.click(); return true; }})()",
            js_str(label),
            js_str(CLICKABLE)
        );
        tokio::time::timeout(timeout, self.eval::<bool>(script))
            .await
            .map_err(|_| anyhow!("Click on `{}` timed out", label))?
    }

    async fn inner_texts(&self, selector: &str) -> Result<Vec<String>> {
        self.eval(format!(
            "Array.from(document.querySelectorAll({})).map(e => e.innerText || '')",
            js_str(selector)
        ))
        .await
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        self.eval(format!(
            "document.querySelector({}) !== null",
            js_str(selector)
        ))
        .await
    }

    async fn has_text(&self, marker: &str) -> Result<bool> {
        self.eval(format!(
            "!!(document.body && document.body.innerText.includes({}))",
            js_str(marker)
        ))
        .await
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<()> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(full_page).build(), path)
            .await
            .with_context(|| format!("Failed to save screenshot: {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl SessionContainer for ChromeSession {
    async fn storage_state(&self) -> Result<SessionState> {
        // Every domain, not just the page's: the login spans several hosts.
        let cookies = self
            .browser
            .get_cookies()
            .await
            .context("Failed to read cookies")?;
        Ok(SessionState {
            cookies: cookies
                .into_iter()
                .map(|c| StoredCookie {
                    name: c.name,
                    value: c.value,
                    domain: c.domain,
                    path: c.path,
                    expires: stored_expiry(c.session, c.expires),
                    http_only: c.http_only,
                    secure: c.secure,
                })
                .collect(),
            saved_at: None,
        })
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(error = %e, "browser process did not exit cleanly");
        }
        self.handler.abort();
        result.context("Failed to close browser")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(domain: &str, expires: Option<f64>) -> StoredCookie {
        StoredCookie {
            name: "MUID".to_string(),
            value: "abc".to_string(),
            domain: domain.to_string(),
            path: "/".to_string(),
            expires,
            http_only: true,
            secure: true,
        }
    }

    #[test]
    fn cookie_params_are_scoped_by_domain_not_page() {
        // Browser-wide install needs a domain on every cookie; no URL is set.
        let param = to_cookie_param(&cookie(".login.microsoftonline.com", Some(1_900_000_000.0)));
        assert_eq!(param.name, "MUID");
        assert_eq!(param.value, "abc");
        assert_eq!(param.domain.as_deref(), Some(".login.microsoftonline.com"));
        assert_eq!(param.path.as_deref(), Some("/"));
        assert!(param.url.is_none());
        assert_eq!(param.secure, Some(true));
        assert_eq!(param.http_only, Some(true));
        assert!(param.expires.is_some());
    }

    #[test]
    fn session_cookie_has_no_expiry_param() {
        let param = to_cookie_param(&cookie(".microsoft.com", None));
        assert!(param.expires.is_none());
    }

    #[test]
    fn exported_expiry_drops_session_cookies() {
        assert_eq!(stored_expiry(true, 1_900_000_000.0), None);
        assert_eq!(stored_expiry(false, -1.0), None);
        assert_eq!(stored_expiry(false, 1_900_000_000.0), Some(1_900_000_000.0));
    }

    #[test]
    fn js_strings_are_escaped() {
        assert_eq!(js_str(r#"a"b"#), r#""a\"b""#);
    }
}
