//! # Run Scope
//!
//! A per-run namespace over the shared [`ArtifactStore`]. Every pipeline
//! execution gets its own scope keyed by a fresh run id; all paths the
//! pipeline presents are prefixed with that id before touching shared
//! state, so concurrent runs can never observe or overwrite each other's
//! artifacts, and clearing one run leaves its siblings intact.

use std::sync::Arc;

use crate::config::StageToggles;
use crate::error::{Error, Result};
use crate::pipeline::ArtifactAccess;

use super::{normalize_path, ArtifactStore};

/// File name the polish stage writes.
pub const POLISHED_ARTICLE_FILE: &str = "polished_article.txt";
/// File name the drafting stage writes.
pub const DRAFT_ARTICLE_FILE: &str = "storm_gen_article.txt";

/// One run's private view of the artifact store.
#[derive(Debug, Clone)]
pub struct RunScope {
    run_id: String,
    store: Arc<ArtifactStore>,
}

impl RunScope {
    /// Allocate a scope with a fresh run id.
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            store,
        }
    }

    /// The run identifier this scope is keyed by.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn scoped(&self, path: &str) -> String {
        format!("{}/{}", self.run_id, normalize_path(path))
    }

    /// List this run's paths, scope-relative.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        let strip = format!("{}/", self.run_id);
        self.store
            .list(&self.scoped(prefix))
            .into_iter()
            .filter_map(|path| path.strip_prefix(&strip).map(str::to_string))
            .collect()
    }

    /// Drop every artifact belonging to this run.
    pub fn clear(&self) {
        self.store.clear_prefix(&self.run_id);
    }

    /// Locate the final article among this run's artifacts.
    ///
    /// Prefers the polished article when the polish stage was enabled,
    /// falls back to the draft. A successful run that produced neither is
    /// a pipeline contract violation and surfaces as
    /// [`Error::Resolution`] rather than an empty article.
    pub fn resolve_article(&self, toggles: &StageToggles) -> Result<String> {
        let files = self.list("");
        if files.is_empty() {
            return Err(Error::resolution("no files were generated in storage"));
        }

        if toggles.do_polish_article {
            if let Some(path) = files.iter().find(|f| file_name(f) == POLISHED_ARTICLE_FILE) {
                return Ok(self.read(path));
            }
        }

        if let Some(path) = files.iter().find(|f| file_name(f) == DRAFT_ARTICLE_FILE) {
            return Ok(self.read(path));
        }

        Err(Error::resolution(format!(
            "no article file found, available files: {files:?}"
        )))
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl ArtifactAccess for RunScope {
    fn write(&self, path: &str, content: &str) {
        self.store.write(&self.scoped(path), content);
    }

    fn read(&self, path: &str) -> String {
        self.store.read(&self.scoped(path))
    }

    fn exists(&self, path: &str) -> bool {
        self.store.exists(&self.scoped(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_scopes() -> (RunScope, RunScope, Arc<ArtifactStore>) {
        let store = Arc::new(ArtifactStore::new());
        (
            RunScope::new(Arc::clone(&store)),
            RunScope::new(Arc::clone(&store)),
            store,
        )
    }

    #[test]
    fn test_scopes_are_isolated() {
        let (a, b, _store) = two_scopes();
        a.write("topic/draft.txt", "A");
        b.write("topic/draft.txt", "B");

        assert_eq!(a.read("topic/draft.txt"), "A");
        assert_eq!(b.read("topic/draft.txt"), "B");
        assert_eq!(a.list("").len(), 1);
    }

    #[test]
    fn test_scoped_clear_leaves_sibling_runs() {
        let (a, b, store) = two_scopes();
        a.write("x.txt", "A");
        b.write("x.txt", "B");

        a.clear();
        assert!(!a.exists("x.txt"));
        assert!(b.exists("x.txt"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_list_is_scope_relative() {
        let (a, _b, _store) = two_scopes();
        a.write("topic/one.txt", "1");
        a.write("topic/two.txt", "2");
        assert_eq!(a.list("topic"), vec!["topic/one.txt", "topic/two.txt"]);
    }

    #[test]
    fn test_resolution_prefers_polished() {
        let (a, _b, _store) = two_scopes();
        a.write("topic/storm_gen_article.txt", "D");
        a.write("topic/polished_article.txt", "P");

        let all_on = StageToggles::default();
        assert_eq!(a.resolve_article(&all_on).unwrap(), "P");

        let no_polish = StageToggles {
            do_polish_article: false,
            ..StageToggles::default()
        };
        assert_eq!(a.resolve_article(&no_polish).unwrap(), "D");
    }

    #[test]
    fn test_resolution_falls_back_to_draft() {
        let (a, _b, _store) = two_scopes();
        a.write("topic/storm_gen_article.txt", "D");
        assert_eq!(a.resolve_article(&StageToggles::default()).unwrap(), "D");
    }

    #[test]
    fn test_resolution_failure_is_not_empty_output() {
        let (a, _b, _store) = two_scopes();
        let err = a.resolve_article(&StageToggles::default()).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));

        // Unrelated files present but no article: still a resolution error.
        a.write("topic/conversation_log.json", "[]");
        let err = a.resolve_article(&StageToggles::default()).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn test_exact_file_name_match_not_substring() {
        let (a, _b, _store) = two_scopes();
        // A file that merely contains the marker in its name must not win.
        a.write("topic/not_polished_article.txt.bak", "X");
        a.write("topic/storm_gen_article.txt", "D");
        assert_eq!(a.resolve_article(&StageToggles::default()).unwrap(), "D");
    }
}
