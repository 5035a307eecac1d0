//! Gitignore-style path filter shared by watchers and the initial scanner

use std::collections::HashSet;
use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{Result, SyncError};

/// Decides which relative paths take part in sync
#[derive(Debug, Clone)]
pub struct PathFilter {
    patterns: Gitignore,
    exact: HashSet<String>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self {
            patterns: Gitignore::empty(),
            exact: HashSet::new(),
        }
    }
}

impl PathFilter {
    /// Build a filter from gitignore-style lines (`*.tmp`, `build/`, `!keep.tmp`)
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] if a pattern is not a valid glob.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // Paths are matched relative to their root, so the builder root is "."
        let mut builder = GitignoreBuilder::new(".");
        for pattern in patterns {
            let pattern = pattern.as_ref();
            builder
                .add_line(None, pattern)
                .map_err(|e| SyncError::Config {
                    path: Path::new("ignore").to_path_buf(),
                    message: format!("bad pattern {pattern:?}: {e}"),
                })?;
        }
        let patterns = builder.build().map_err(|e| SyncError::Config {
            path: Path::new("ignore").to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(Self {
            patterns,
            exact: HashSet::new(),
        })
    }

    /// Always skip this exact relative path, plus the temp files the snapshot
    /// store writes next to it.
    #[must_use]
    pub fn exclude_file(mut self, rel: &str) -> Self {
        self.exact.insert(rel.to_string());
        self
    }

    /// Whether `rel` (a `/`-separated relative path) is excluded
    #[must_use]
    pub fn is_ignored(&self, rel: &str, is_dir: bool) -> bool {
        if self.is_excluded_exact(rel) {
            return true;
        }
        self.patterns
            .matched_path_or_any_parents(Path::new(rel), is_dir)
            .is_ignore()
    }

    fn is_excluded_exact(&self, rel: &str) -> bool {
        if self.exact.contains(rel) {
            return true;
        }
        // Snapshot temp files look like `<dir>/.<name>.<pid>.tmp`
        let (dir, name) = rel.rsplit_once('/').unwrap_or(("", rel));
        let Some(stem) = name
            .strip_prefix('.')
            .and_then(|n| n.strip_suffix(".tmp"))
            .and_then(|n| n.rsplit_once('.').map(|(file, _pid)| file))
        else {
            return false;
        };
        let candidate = if dir.is_empty() {
            stem.to_string()
        } else {
            format!("{dir}/{stem}")
        };
        self.exact.contains(&candidate)
    }
}
