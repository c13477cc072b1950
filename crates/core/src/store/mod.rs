//! # In-Memory Artifact Storage
//!
//! A process-wide substitute for the filesystem. Every file the pipeline
//! reads or writes during a run lands here instead of on disk, so no
//! intermediate artifact (conversation log, outline, draft) ever leaves
//! RAM.
//!
//! Paths are normalized to forward slashes before use; that is the only
//! semantic transformation. Writes overwrite silently, reads of absent
//! paths return an empty string, and nothing here can fail; the whole
//! point is to bypass real filesystem errors.

mod scope;

pub use scope::{RunScope, DRAFT_ARTICLE_FILE, POLISHED_ARTICLE_FILE};

use std::collections::HashMap;
use std::sync::RwLock;

/// Normalize a file path to use forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Shared in-memory file store.
///
/// Thread-safe; written from synchronous pipeline worker threads and read
/// from async request handlers. Entries never expire on their own; they
/// are removed only by the explicit clear operations tied to run
/// boundaries.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    entries: RwLock<HashMap<String, String>>,
}

impl ArtifactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store content under a normalized path, replacing any prior value.
    pub fn write(&self, path: &str, content: &str) {
        let key = normalize_path(path);
        self.entries
            .write()
            .expect("artifact store lock poisoned")
            .insert(key, content.to_string());
    }

    /// Read content for a path, or an empty string if absent.
    pub fn read(&self, path: &str) -> String {
        let key = normalize_path(path);
        self.entries
            .read()
            .expect("artifact store lock poisoned")
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a path has been written.
    pub fn exists(&self, path: &str) -> bool {
        let key = normalize_path(path);
        self.entries
            .read()
            .expect("artifact store lock poisoned")
            .contains_key(&key)
    }

    /// List all stored paths under a prefix.
    ///
    /// A non-empty prefix is coerced to end with a separator, so
    /// `list("a")` matches `a/b.txt` but not `ab.txt`. Results are sorted
    /// for deterministic iteration.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        let mut prefix = normalize_path(prefix);
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        let mut paths: Vec<String> = self
            .entries
            .read()
            .expect("artifact store lock poisoned")
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Remove every entry under a prefix (coerced like [`list`]).
    ///
    /// [`list`]: ArtifactStore::list
    pub fn clear_prefix(&self, prefix: &str) {
        let mut prefix = normalize_path(prefix);
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.entries
            .write()
            .expect("artifact store lock poisoned")
            .retain(|key, _| !key.starts_with(&prefix));
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries
            .write()
            .expect("artifact store lock poisoned")
            .clear();
    }

    /// Number of files currently stored.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("artifact store lock poisoned")
            .len()
    }

    /// Whether the store holds no files.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
