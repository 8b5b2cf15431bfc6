//! Objective catalog and per-session draw orders.
//!
//! The catalog holds two ordered buckets of objective text: `active`
//! (in play) and `backlog` (drafts). External callers address entries with
//! 1-based indexes. Each session takes a private shuffled copy of the active
//! bucket when it is created, so later catalog edits never reach running
//! games.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors from catalog edits and persistence.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No task #{index} in {bucket} (it has {len})")]
    OutOfRange {
        bucket: Bucket,
        index: usize,
        len: usize,
    },

    #[error("Task text is empty")]
    EmptyTask,
}

/// One of the two named lists in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Active,
    Backlog,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Active => write!(f, "active"),
            Bucket::Backlog => write!(f, "backlog"),
        }
    }
}

/// An administrative change to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogEdit {
    /// Append a new draft to the backlog.
    AddToBacklog(String),
    /// Move backlog entry `index` (1-based) to the end of the active list.
    Promote(usize),
    /// Move active entry `index` (1-based) to the end of the backlog.
    Demote(usize),
    /// Remove an entry.
    Delete { bucket: Bucket, index: usize },
}

/// The global objective catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCatalog {
    #[serde(default)]
    pub active: Vec<String>,
    #[serde(default)]
    pub backlog: Vec<String>,
}

impl TaskCatalog {
    pub fn new(active: Vec<String>, backlog: Vec<String>) -> Self {
        Self { active, backlog }
    }

    /// Entries of a bucket in order.
    pub fn list(&self, bucket: Bucket) -> &[String] {
        match bucket {
            Bucket::Active => &self.active,
            Bucket::Backlog => &self.backlog,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<String> {
        match bucket {
            Bucket::Active => &mut self.active,
            Bucket::Backlog => &mut self.backlog,
        }
    }

    /// Up to `n` distinct active entries in random order.
    ///
    /// `sample(self.active.len(), rng)` is a full permutation of the
    /// active bucket.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<String> {
        let mut order = self.active.clone();
        order.shuffle(rng);
        order.truncate(n);
        order
    }

    /// Apply an edit. Out-of-range indexes leave the catalog untouched.
    pub fn apply(&mut self, edit: CatalogEdit) -> Result<(), CatalogError> {
        match edit {
            CatalogEdit::AddToBacklog(text) => self.add_to_backlog(text),
            CatalogEdit::Promote(index) => self.transfer(Bucket::Backlog, Bucket::Active, index),
            CatalogEdit::Demote(index) => self.transfer(Bucket::Active, Bucket::Backlog, index),
            CatalogEdit::Delete { bucket, index } => self.delete(bucket, index).map(|_| ()),
        }
    }

    pub fn add_to_backlog(&mut self, text: impl Into<String>) -> Result<(), CatalogError> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::EmptyTask);
        }
        self.backlog.push(trimmed.to_string());
        Ok(())
    }

    /// Remove entry `index` (1-based) from `bucket` and return it.
    pub fn delete(&mut self, bucket: Bucket, index: usize) -> Result<String, CatalogError> {
        let position = self.position(bucket, index)?;
        Ok(self.bucket_mut(bucket).remove(position))
    }

    fn transfer(&mut self, from: Bucket, to: Bucket, index: usize) -> Result<(), CatalogError> {
        let task = self.delete(from, index)?;
        self.bucket_mut(to).push(task);
        Ok(())
    }

    fn position(&self, bucket: Bucket, index: usize) -> Result<usize, CatalogError> {
        let len = self.list(bucket).len();
        if index == 0 || index > len {
            return Err(CatalogError::OutOfRange { bucket, index, len });
        }
        Ok(index - 1)
    }
}

/// On-disk shape accepted when loading. A bare array is the older
/// active-only format.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCatalog {
    Buckets(TaskCatalog),
    ActiveOnly(Vec<String>),
}

/// JSON file backing the catalog.
#[derive(Debug, Clone)]
pub struct CatalogFile {
    path: PathBuf,
}

impl CatalogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<TaskCatalog, CatalogError> {
        let content = fs::read_to_string(&self.path).await?;
        let stored: StoredCatalog = serde_json::from_str(&content)?;
        Ok(match stored {
            StoredCatalog::Buckets(catalog) => catalog,
            StoredCatalog::ActiveOnly(active) => TaskCatalog::new(active, Vec::new()),
        })
    }

    /// Write the catalog, replacing the file atomically.
    pub async fn save(&self, catalog: &TaskCatalog) -> Result<(), CatalogError> {
        let content = serde_json::to_string_pretty(catalog)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

// ============================================================================
// Draw order
// ============================================================================

/// A session's private draw order.
///
/// Shrinks monotonically; once empty every further draw reports
/// exhaustion.
#[derive(Debug, Clone, Default)]
pub struct ObjectivePool {
    order: VecDeque<String>,
}

impl ObjectivePool {
    /// Shuffle the whole active bucket into a fresh draw order.
    pub fn from_catalog<R: Rng + ?Sized>(catalog: &TaskCatalog, rng: &mut R) -> Self {
        Self {
            order: catalog.sample(catalog.active.len(), rng).into(),
        }
    }

    /// A pool that draws in exactly the given order.
    pub fn from_ordered(tasks: impl IntoIterator<Item = String>) -> Self {
        Self {
            order: tasks.into_iter().collect(),
        }
    }

    /// Remove and return the next objective, or `None` when exhausted.
    pub fn draw_next(&mut self) -> Option<String> {
        self.order.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.order.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.order.is_empty()
    }
}
