//! Core data models that flow through a run.
//!
//! A [`PaperEntry`] comes back from the search index, becomes an [`Artifact`]
//! once its PDF is on disk, and yields at most one [`SummaryRecord`] per
//! submission.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One search hit, before download.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperEntry {
    /// Short stable identifier (e.g. `2410.01234v1`). History key and file stem.
    pub id: String,
    pub title: String,
    pub pdf_url: String,
    pub published: Option<DateTime<Utc>>,
}

impl PaperEntry {
    /// File name of the downloaded PDF: `<id>.pdf`.
    pub fn pdf_file_name(&self) -> String {
        format!("{}.pdf", file_stem(&self.id))
    }
}

/// A downloaded paper.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub path: PathBuf,
}

impl Artifact {
    /// `<id>_error.png` inside `dir`.
    pub fn error_snapshot_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_error.png", file_stem(&self.id)))
    }
}

/// A generated summary, keyed by paper and creation time.
#[derive(Debug, Clone)]
pub struct SummaryRecord {
    pub id: String,
    pub created_at: DateTime<Local>,
    pub text: String,
}

impl SummaryRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Local::now(),
            text: text.into(),
        }
    }

    /// `<id>_<YYYYMMDD_HHMMSS>.md`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.md",
            file_stem(&self.id),
            self.created_at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write the record under `dir`. Fails rather than replacing an existing file.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create summaries dir: {}", dir.display()))?;
        let path = dir.join(self.file_name());
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("Failed to create summary file: {}", path.display()))?;
        file.write_all(self.text.as_bytes())
            .with_context(|| format!("Failed to write summary file: {}", path.display()))?;
        Ok(path)
    }
}

/// Make an identifier safe to use as a file stem (old-style ids contain `/`).
pub fn file_stem(id: &str) -> String {
    id.replace(['/', '\\'], "_")
}
