//! TOML configuration parsing.
//!
//! Every tunable of a run lives here: the search query and result cap, the
//! backoff numerics used between downloads, the instruction sent to the
//! assistant, the completion-detection timings, the UI selectors, and the
//! on-disk layout.
//!
//! All sections are optional. A missing file means "use the defaults", which
//! reproduce the behavior of a stock run against arXiv and Copilot.
//!
//! ```toml
//! [search]
//! query = "causal"
//! max_results = 2
//!
//! [backoff]
//! base_delay_secs = 1.0
//! jitter_secs = 0.5
//! max_delay_secs = 8.0
//!
//! [timing]
//! idle_secs = 12
//! min_output_secs = 15
//! max_wait_secs = 480
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Instruction sent with every uploaded paper.
pub const DEFAULT_PROMPT: &str =
    "请总结这篇论文的题目，作者机构，贡献与方法，不用公式表达。只需要回答不需要其他内容。";

/// Upper bound accepted by the arXiv export API for a single request.
const ARXIV_MAX_PAGE: usize = 2000;

/// Longest pause between downloads (and largest jitter) accepted, in seconds.
const MAX_BACKOFF_SECS: f64 = 3600.0;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            max_results: default_max_results(),
            api_url: default_api_url(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_query() -> String {
    "causal".to_string()
}
fn default_max_results() -> usize {
    2
}
fn default_api_url() -> String {
    "https://export.arxiv.org/api/query".to_string()
}
fn default_http_timeout() -> u64 {
    60
}

/// Pacing between successive downloads.
#[derive(Debug, Deserialize, Clone)]
pub struct BackoffConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,
    #[serde(default = "default_jitter")]
    pub jitter_secs: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            jitter_secs: default_jitter(),
            max_delay_secs: default_max_delay(),
        }
    }
}

fn default_base_delay() -> f64 {
    1.0
}
fn default_jitter() -> f64 {
    0.5
}
fn default_max_delay() -> f64 {
    8.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            prompt: default_prompt(),
            headless: false,
            chrome_executable: None,
            navigation_timeout_secs: default_navigation_timeout(),
        }
    }
}

impl AssistantConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

fn default_base_url() -> String {
    "https://copilot.microsoft.com".to_string()
}
fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}
fn default_navigation_timeout() -> u64 {
    120
}

/// Completion-detection timings for one submission.
#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    /// How long the answer text must stay unchanged.
    #[serde(default = "default_idle")]
    pub idle_secs: u64,
    /// Earliest point (from the copy affordance appearing) a completion may be declared.
    #[serde(default = "default_min_output")]
    pub min_output_secs: u64,
    /// Hard stop for the stabilization loop.
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
    #[serde(default = "default_copy_click_timeout")]
    pub copy_click_timeout_secs: u64,
    #[serde(default = "default_clipboard_settle")]
    pub clipboard_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            idle_secs: default_idle(),
            min_output_secs: default_min_output(),
            max_wait_secs: default_max_wait(),
            poll_interval_ms: default_poll_interval(),
            upload_timeout_secs: default_upload_timeout(),
            response_timeout_secs: default_response_timeout(),
            copy_click_timeout_secs: default_copy_click_timeout(),
            clipboard_settle_ms: default_clipboard_settle(),
        }
    }
}

impl TimingConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
    pub fn min_output(&self) -> Duration {
        Duration::from_secs(self.min_output_secs)
    }
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
    pub fn copy_click_timeout(&self) -> Duration {
        Duration::from_secs(self.copy_click_timeout_secs)
    }
    pub fn clipboard_settle(&self) -> Duration {
        Duration::from_millis(self.clipboard_settle_ms)
    }
}

fn default_idle() -> u64 {
    12
}
fn default_min_output() -> u64 {
    15
}
fn default_max_wait() -> u64 {
    480
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_upload_timeout() -> u64 {
    30
}
fn default_response_timeout() -> u64 {
    300
}
fn default_copy_click_timeout() -> u64 {
    3
}
fn default_clipboard_settle() -> u64 {
    500
}

/// CSS selectors and text markers of the assistant UI.
#[derive(Debug, Deserialize, Clone)]
pub struct SelectorConfig {
    #[serde(default = "default_file_input")]
    pub file_input: String,
    /// Any of these present means the upload finished.
    #[serde(default = "default_upload_done")]
    pub upload_done: Vec<String>,
    /// Page text that also signals a finished upload.
    #[serde(default = "default_upload_done_text")]
    pub upload_done_text: Option<String>,
    #[serde(default = "default_prompt_input")]
    pub prompt_input: String,
    #[serde(default = "default_copy_button")]
    pub copy_button: String,
    #[serde(default = "default_answer")]
    pub answer: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            file_input: default_file_input(),
            upload_done: default_upload_done(),
            upload_done_text: default_upload_done_text(),
            prompt_input: default_prompt_input(),
            copy_button: default_copy_button(),
            answer: default_answer(),
        }
    }
}

fn default_file_input() -> String {
    r#"input[type="file"]"#.to_string()
}
fn default_upload_done() -> Vec<String> {
    vec![r#"div[class*="file-card"]"#.to_string()]
}
fn default_upload_done_text() -> Option<String> {
    Some("已上传".to_string())
}
fn default_prompt_input() -> String {
    "textarea".to_string()
}
fn default_copy_button() -> String {
    r#"[data-testid="copy-message-button"]"#.to_string()
}
fn default_answer() -> String {
    "div.space-y-3.mt-3".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Consent-dialog button labels, tried in order.
    #[serde(default = "default_consent_labels")]
    pub consent_labels: Vec<String>,
    #[serde(default = "default_consent_timeout")]
    pub consent_click_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            consent_labels: default_consent_labels(),
            consent_click_timeout_ms: default_consent_timeout(),
        }
    }
}

impl SessionConfig {
    pub fn consent_click_timeout(&self) -> Duration {
        Duration::from_millis(self.consent_click_timeout_ms)
    }
}

fn default_consent_labels() -> Vec<String> {
    ["接受所有", "同意", "Accept all", "Agree"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_consent_timeout() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_papers_dir")]
    pub papers_dir: PathBuf,
    #[serde(default = "default_summaries_dir")]
    pub summaries_dir: PathBuf,
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            papers_dir: default_papers_dir(),
            summaries_dir: default_summaries_dir(),
            history_file: default_history_file(),
            session_file: default_session_file(),
        }
    }
}

fn default_papers_dir() -> PathBuf {
    PathBuf::from("papers")
}
fn default_summaries_dir() -> PathBuf {
    PathBuf::from("summaries")
}
fn default_history_file() -> PathBuf {
    PathBuf::from("history.json")
}
fn default_session_file() -> PathBuf {
    PathBuf::from("auth_state.json")
}

/// Load and validate the configuration at `path`.
///
/// A missing file yields [`Config::default`]; a present but malformed or
/// inconsistent file is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

fn validate(config: &Config) -> Result<()> {
    // Search
    if config.search.query.trim().is_empty() {
        bail!("search.query must not be empty");
    }
    if config.search.max_results > ARXIV_MAX_PAGE {
        bail!("search.max_results must be <= {}", ARXIV_MAX_PAGE);
    }

    // Backoff
    let b = &config.backoff;
    for (key, value) in [
        ("base_delay_secs", b.base_delay_secs),
        ("jitter_secs", b.jitter_secs),
        ("max_delay_secs", b.max_delay_secs),
    ] {
        if !value.is_finite() || value > MAX_BACKOFF_SECS {
            bail!(
                "backoff.{} must be a finite number <= {} (got {})",
                key,
                MAX_BACKOFF_SECS,
                value
            );
        }
    }
    if !(b.base_delay_secs > 0.0) || !(b.max_delay_secs > 0.0) {
        bail!("backoff.base_delay_secs and backoff.max_delay_secs must be > 0");
    }
    if !(b.jitter_secs >= 0.0) {
        bail!("backoff.jitter_secs must be >= 0");
    }
    if b.base_delay_secs > b.max_delay_secs {
        bail!(
            "backoff.base_delay_secs ({}) must be <= backoff.max_delay_secs ({})",
            b.base_delay_secs,
            b.max_delay_secs
        );
    }

    // Assistant
    if config.assistant.base_url.trim().is_empty() {
        bail!("assistant.base_url must not be empty");
    }
    if config.assistant.prompt.trim().is_empty() {
        bail!("assistant.prompt must not be empty");
    }

    // Timing
    let t = &config.timing;
    if t.poll_interval_ms == 0 {
        bail!("timing.poll_interval_ms must be > 0");
    }
    if t.min_output_secs > t.max_wait_secs {
        bail!("timing.min_output_secs must be <= timing.max_wait_secs");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.search.query, "causal");
        assert_eq!(cfg.search.max_results, 2);
        assert_eq!(cfg.backoff.base_delay_secs, 1.0);
        assert_eq!(cfg.backoff.jitter_secs, 0.5);
        assert_eq!(cfg.backoff.max_delay_secs, 8.0);
        assert_eq!(cfg.timing.idle(), Duration::from_secs(12));
        assert_eq!(cfg.timing.min_output(), Duration::from_secs(15));
        assert_eq!(cfg.timing.max_wait(), Duration::from_secs(480));
        assert_eq!(cfg.timing.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.timing.upload_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.timing.response_timeout(), Duration::from_secs(300));
        assert_eq!(cfg.paths.history_file, PathBuf::from("history.json"));
        assert_eq!(cfg.session.consent_labels.len(), 4);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_config(
            r#"
[search]
query = "cat:cs.LG"

[timing]
idle_secs = 5
"#,
        )
        .unwrap();
        assert_eq!(cfg.search.query, "cat:cs.LG");
        assert_eq!(cfg.search.max_results, 2);
        assert_eq!(cfg.timing.idle_secs, 5);
        assert_eq!(cfg.timing.max_wait_secs, 480);
    }

    #[test]
    fn rejects_base_delay_above_max() {
        let cfg = parse_config(
            r#"
[backoff]
base_delay_secs = 10.0
max_delay_secs = 2.0
"#,
        )
        .unwrap();
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("base_delay_secs"));
    }

    #[test]
    fn rejects_infinite_backoff() {
        let cfg = parse_config("[backoff]\nbase_delay_secs = inf\nmax_delay_secs = inf\n").unwrap();
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("base_delay_secs"));
    }

    #[test]
    fn rejects_nan_jitter() {
        let cfg = parse_config("[backoff]\njitter_secs = nan\n").unwrap();
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("jitter_secs"));
    }

    #[test]
    fn rejects_backoff_above_ceiling() {
        let cfg = parse_config("[backoff]\nmax_delay_secs = 1e300\n").unwrap();
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("max_delay_secs"));

        let cfg = parse_config("[backoff]\njitter_secs = 1e308\n").unwrap();
        assert!(validate(&cfg).is_err());

        let cfg = parse_config("[backoff]\nmax_delay_secs = 3600.0\njitter_secs = 3600.0\n").unwrap();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let cfg = parse_config("[timing]\npoll_interval_ms = 0\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_min_output_above_max_wait() {
        let cfg = parse_config("[timing]\nmin_output_secs = 600\nmax_wait_secs = 60\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.assistant.base_url, "https://copilot.microsoft.com");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[search\nquery = 1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }
}
