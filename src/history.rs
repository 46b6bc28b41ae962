//! Set of paper identifiers already processed.
//!
//! Stored as a pretty-printed JSON array of strings. Order on disk carries no
//! meaning; it is written sorted so the file diffs cleanly between runs.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    ids: HashSet<String>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the history file, or start empty if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read history file: {}", path.display()))?;
        let ids: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse history file: {}", path.display()))?;
        Ok(Self {
            ids: ids.into_iter().collect(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create dir: {}", parent.display()))?;
        }
        let mut ids: Vec<&String> = self.ids.iter().collect();
        ids.sort();
        let json = serde_json::to_string_pretty(&ids)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write history file: {}", path.display()))?;
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<String> for History {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
