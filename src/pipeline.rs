//! End-to-end run: fetch new papers, summarize each, persist the results.
//!
//! ```text
//! session file? ──▶ history ──▶ fetch ──▶ for each artifact:
//!                                           open ─▶ submit ─▶ write summary ─▶ close
//!                                           (failure: log, snapshot, close, next)
//!                                         save history
//! ```
//!
//! A missing session file aborts the run before anything is searched or
//! launched. After that, failures are contained per paper: one bad
//! submission never stops the rest, and the history file is rewritten after
//! every item so a crash loses at most the paper in flight.

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::arxiv::ArxivClient;
use crate::clipboard::{ClipboardReader, SystemClipboard};
use crate::config::Config;
use crate::fetch::{self, FetchPlan, PaperSource, SearchQuery, SortOrder, Throttle, TokioThrottle};
use crate::history::History;
use crate::models::{Artifact, SummaryRecord};
use crate::session::{ensure_session_file, ChromeSessionFactory};
use crate::submit::Submitter;
use crate::surface::{AssistantPage, InteractiveSurface, SessionContainer};

/// Opens one ready-to-use assistant page per paper.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: AssistantPage;

    async fn open(&self) -> Result<Self::Session>;
}

/// Counts printed at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub summarized: usize,
    pub failed: usize,
}

/// Run the pipeline with the production arXiv client, Chromium and clipboard.
pub async fn run_pipeline(config: &Config) -> Result<RunReport> {
    let source = ArxivClient::new(&config.search)?;
    let sessions = ChromeSessionFactory::new(config);
    let mut throttle = TokioThrottle;
    let mut rng = StdRng::from_entropy();

    run_with(
        config,
        &source,
        &sessions,
        &SystemClipboard,
        &mut throttle,
        &mut rng,
    )
    .await
}

pub async fn run_with<P, F, C, T, R>(
    config: &Config,
    source: &P,
    sessions: &F,
    clipboard: &C,
    throttle: &mut T,
    rng: &mut R,
) -> Result<RunReport>
where
    P: PaperSource + ?Sized,
    F: SessionFactory + ?Sized,
    C: ClipboardReader + ?Sized,
    T: Throttle + ?Sized,
    R: Rng + Send + ?Sized,
{
    let paths = &config.paths;
    ensure_session_file(&paths.session_file)?;

    let mut history = History::load(&paths.history_file)?;
    tracing::debug!(known = history.len(), "history loaded");

    let plan = FetchPlan {
        query: SearchQuery {
            text: config.search.query.clone(),
            max_results: config.search.max_results,
            order: SortOrder::SubmittedDescending,
        },
        papers_dir: paths.papers_dir.clone(),
        backoff: config.backoff.clone(),
    };
    let artifacts = fetch::fetch_new_papers(source, throttle, rng, &mut history, &plan).await?;

    let mut report = RunReport {
        fetched: artifacts.len(),
        ..RunReport::default()
    };

    if artifacts.is_empty() {
        tracing::info!(query = %config.search.query, "no new papers");
        history.save(&paths.history_file)?;
        return Ok(report);
    }
    tracing::info!(count = artifacts.len(), "new papers to summarize");

    let submitter = Submitter::new(&config.assistant, &config.timing, &config.selectors);
    for artifact in &artifacts {
        if summarize_one(config, &submitter, sessions, clipboard, artifact).await {
            report.summarized += 1;
        } else {
            report.failed += 1;
        }
        history.save(&paths.history_file)?;
    }

    Ok(report)
}

/// Summarize a single artifact in its own session. Never fails; returns
/// whether a summary was written.
async fn summarize_one<F, C>(
    config: &Config,
    submitter: &Submitter,
    sessions: &F,
    clipboard: &C,
    artifact: &Artifact,
) -> bool
where
    F: SessionFactory + ?Sized,
    C: ClipboardReader + ?Sized,
{
    let summaries_dir = &config.paths.summaries_dir;

    let mut session = match sessions.open().await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(paper_id = %artifact.id, error = %format!("{:#}", e), "failed to open assistant session");
            return false;
        }
    };

    let outcome = async {
        let text = submitter.submit(&session, clipboard, artifact).await?;
        SummaryRecord::new(artifact.id.clone(), text).write_to(summaries_dir)
    }
    .await;

    let ok = match outcome {
        Ok(path) => {
            tracing::info!(paper_id = %artifact.id, path = %path.display(), "summary saved");
            true
        }
        Err(e) => {
            tracing::error!(paper_id = %artifact.id, error = %format!("{:#}", e), "summarization failed");
            save_snapshot(&session, artifact, summaries_dir).await;
            false
        }
    };

    if let Err(e) = session.close().await {
        tracing::warn!(paper_id = %artifact.id, error = %e, "failed to close session");
    }
    ok
}

async fn save_snapshot<S>(surface: &S, artifact: &Artifact, dir: &std::path::Path)
where
    S: InteractiveSurface + ?Sized,
{
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!(error = %e, "could not create snapshot dir");
        return;
    }
    let path = artifact.error_snapshot_path(dir);
    match surface.screenshot(&path, true).await {
        Ok(()) => tracing::info!(paper_id = %artifact.id, path = %path.display(), "error snapshot saved"),
        Err(e) => tracing::warn!(paper_id = %artifact.id, error = %e, "error snapshot failed"),
    }
}
