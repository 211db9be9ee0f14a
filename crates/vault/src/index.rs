//! In-memory projection of the vault directory: a `wiki-link text -> file
//! path` cache built by a one-time `walkdir` scan, re-walked on a lookup
//! miss so a note created by another process (or by a previous pipeline
//! run) is picked up without a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use minerva_domain::{PipelineError, Result};
use walkdir::WalkDir;

/// `[[wiki link]]` targets resolve by filename stem (Obsidian's default
/// link-resolution rule), case-sensitively.
pub struct VaultIndex {
    root: PathBuf,
    entries: RwLock<HashMap<String, PathBuf>>,
}

impl VaultIndex {
    pub fn build(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let index = Self { root, entries: RwLock::new(HashMap::new()) };
        index.rescan()?;
        Ok(index)
    }

    fn rescan(&self) -> Result<()> {
        let mut entries = HashMap::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                entries.insert(stem.to_string(), path.to_path_buf());
            }
        }
        *self.entries.write().map_err(|_| PipelineError::consistency("vault index lock poisoned"))? = entries;
        Ok(())
    }

    /// Resolve `link_text` to a file path, rescanning the vault once on a
    /// miss before giving up.
    pub fn resolve(&self, link_text: &str) -> Result<Option<PathBuf>> {
        {
            let entries = self.entries.read().map_err(|_| PipelineError::consistency("vault index lock poisoned"))?;
            if let Some(path) = entries.get(link_text) {
                return Ok(Some(path.clone()));
            }
        }
        self.rescan()?;
        let entries = self.entries.read().map_err(|_| PipelineError::consistency("vault index lock poisoned"))?;
        Ok(entries.get(link_text).cloned())
    }

    /// Path a new note for `link_text` would be written to, whether or not
    /// it exists yet.
    pub fn path_for(&self, link_text: &str) -> PathBuf {
        self.root.join(format!("{link_text}.md"))
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
