//! Rate-limited fetch loop.
//!
//! Walks the search results newest-first, downloads every paper not yet in
//! the history, records it, and paces consecutive downloads with a
//! [`Backoff`] schedule. Results already in history are skipped without
//! consuming any delay, and no delay follows the last download.
//!
//! Download errors propagate unchanged: the orchestrator only ever sees a
//! complete list or an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backoff::Backoff;
use crate::config::BackoffConfig;
use crate::history::History;
use crate::models::{Artifact, PaperEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Most recent submission first.
    SubmittedDescending,
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub max_results: usize,
    pub order: SortOrder,
}

/// A search index that can also hand over each hit as a PDF.
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// At most `query.max_results` entries, in `query.order`.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<PaperEntry>>;

    /// Write the entry's PDF to `dest`.
    async fn download(&self, entry: &PaperEntry, dest: &Path) -> Result<()>;
}

/// Suspends the fetch loop between downloads.
#[async_trait]
pub trait Throttle: Send {
    async fn pause(&mut self, delay: Duration);
}

/// Real sleeps on the tokio timer.
pub struct TokioThrottle;

#[async_trait]
impl Throttle for TokioThrottle {
    async fn pause(&mut self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Settings for one call of [`fetch_new_papers`].
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub query: SearchQuery,
    pub papers_dir: PathBuf,
    pub backoff: BackoffConfig,
}

/// Download every new result of `plan.query`, newest first.
///
/// Each downloaded id is added to `history` before the next one is
/// attempted; the caller owns persisting it.
pub async fn fetch_new_papers<S, T, R>(
    source: &S,
    throttle: &mut T,
    rng: &mut R,
    history: &mut History,
    plan: &FetchPlan,
) -> Result<Vec<Artifact>>
where
    S: PaperSource + ?Sized,
    T: Throttle + ?Sized,
    R: Rng + Send + ?Sized,
{
    let entries = source.search(&plan.query).await?;
    tracing::debug!(results = entries.len(), "search returned");

    let mut backoff = Backoff::new(&plan.backoff);
    let mut artifacts = Vec::new();

    for entry in &entries {
        if history.contains(&entry.id) {
            tracing::debug!(paper_id = %entry.id, "already processed, skipping");
            continue;
        }

        if !artifacts.is_empty() {
            let delay = backoff.next_sleep(rng);
            tracing::debug!(delay_ms = delay.as_millis() as u64, "pacing next download");
            throttle.pause(delay).await;
        }

        if artifacts.is_empty() {
            std::fs::create_dir_all(&plan.papers_dir).with_context(|| {
                format!("Failed to create papers dir: {}", plan.papers_dir.display())
            })?;
        }

        let path = plan.papers_dir.join(entry.pdf_file_name());
        source
            .download(entry, &path)
            .await
            .with_context(|| format!("Failed to download paper {}", entry.id))?;

        history.insert(entry.id.clone());
        tracing::info!(paper_id = %entry.id, title = %entry.title, path = %path.display(), "downloaded");
        artifacts.push(Artifact {
            id: entry.id.clone(),
            path,
        });
    }

    Ok(artifacts)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// In-memory source that writes a stub PDF for each download.
    pub struct FakeSource {
        pub entries: Vec<PaperEntry>,
        pub fail_on: Option<String>,
        pub downloads: Mutex<Vec<String>>,
        pub queries: Mutex<Vec<SearchQuery>>,
    }

    impl FakeSource {
        pub fn new(ids: &[&str]) -> Self {
            Self {
                entries: ids
                    .iter()
                    .map(|id| PaperEntry {
                        id: id.to_string(),
                        title: format!("Paper {}", id),
                        pdf_url: format!("https://arxiv.org/pdf/{}", id),
                        published: None,
                    })
                    .collect(),
                fail_on: None,
                downloads: Mutex::new(Vec::new()),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PaperSource for FakeSource {
        async fn search(&self, query: &SearchQuery) -> Result<Vec<PaperEntry>> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self
                .entries
                .iter()
                .take(query.max_results)
                .cloned()
                .collect())
        }

        async fn download(&self, entry: &PaperEntry, dest: &Path) -> Result<()> {
            if self.fail_on.as_deref() == Some(entry.id.as_str()) {
                anyhow::bail!("HTTP 503 for {}", entry.id);
            }
            std::fs::write(dest, b"%PDF-1.4\n%%EOF\n")?;
            self.downloads.lock().unwrap().push(entry.id.clone());
            Ok(())
        }
    }

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    pub struct RecordingThrottle {
        pub delays: Vec<Duration>,
    }

    #[async_trait]
    impl Throttle for RecordingThrottle {
        async fn pause(&mut self, delay: Duration) {
            self.delays.push(delay);
        }
    }
}
