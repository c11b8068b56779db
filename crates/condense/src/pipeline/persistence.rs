//! Durable artifacts and progress accounting.
//!
//! Each document owns exactly one artifact path for the lifetime of its
//! job. Every write fully replaces the previous content — there is no
//! append — and is atomic from a reader's point of view: the content is
//! staged in a temp file in the same directory, then renamed into place, so
//! a concurrent read sees either the previous complete artifact or the new
//! one, never a truncated mix.
//!
//! Intermediate summaries are tagged with the [`PARTIAL_PREFIX`]; the final
//! summary is written untagged. The tag is what lets a later scan tell a
//! finished document from one whose job died partway.

use std::path::{Path, PathBuf};

/// Prefix marking an artifact as the output of an unfinished job.
pub const PARTIAL_PREFIX: &str = "UNFINISHED DOC ";

/// Whether a persisted artifact is an intermediate or the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactTag {
    /// Intermediate summary; content is prefixed with [`PARTIAL_PREFIX`].
    Partial,
    /// Final summary; content is the bare summary text.
    Final,
}

/// What exists at a document's artifact path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    Missing,
    Partial,
    Final,
}

/// Store mapping document ids to single-file artifacts under one directory.
pub struct ArtifactStore {
    artifacts_dir: PathBuf,
}

impl ArtifactStore {
    /// Create a store, ensuring the artifacts directory exists.
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let artifacts_dir = artifacts_dir.into();
        std::fs::create_dir_all(&artifacts_dir)?;
        Ok(Self { artifacts_dir })
    }

    /// The artifacts root directory.
    pub fn dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Deterministic artifact path for a document id.
    pub fn artifact_path(&self, doc_id: &str) -> PathBuf {
        self.artifacts_dir.join(format!("{doc_id}.txt"))
    }

    /// Atomic overwrite: stage in a temp file, then rename into place.
    ///
    /// Persisting the same text twice yields identical content — the write
    /// replaces, never appends.
    pub fn persist(&self, doc_id: &str, text: &str, tag: ArtifactTag) -> Result<PathBuf, String> {
        let final_path = self.artifact_path(doc_id);
        let tmp_path = self.artifacts_dir.join(format!(".{doc_id}.txt.tmp"));

        let content = match tag {
            ArtifactTag::Partial => format!("{PARTIAL_PREFIX}{text}"),
            ArtifactTag::Final => text.to_string(),
        };

        std::fs::write(&tmp_path, content)
            .map_err(|e| format!("Failed to write temp artifact: {e}"))?;
        std::fs::rename(&tmp_path, &final_path)
            .map_err(|e| format!("Failed to rename artifact: {e}"))?;

        Ok(final_path)
    }

    /// Load an artifact's raw content (tag prefix included, when present).
    /// Returns `None` if no artifact exists for the document.
    pub fn load(&self, doc_id: &str) -> Result<Option<String>, String> {
        let path = self.artifact_path(doc_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read artifact: {e}"))?;
        Ok(Some(content))
    }

    /// Classify what exists at the document's artifact path.
    pub fn status(&self, doc_id: &str) -> Result<ArtifactStatus, String> {
        match self.load(doc_id)? {
            None => Ok(ArtifactStatus::Missing),
            Some(content) if content.starts_with(PARTIAL_PREFIX) => Ok(ArtifactStatus::Partial),
            Some(_) => Ok(ArtifactStatus::Final),
        }
    }
}

/// Fraction of the document consumed so far, in `[0, 1]`.
///
/// A zero-chunk document reports `1.0` — there is nothing left to consume.
pub fn progress(chunks_done: usize, chunks_total: usize) -> f64 {
    if chunks_total == 0 {
        1.0
    } else {
        chunks_done as f64 / chunks_total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_final_is_bare_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        let path = store.persist("doc", "the summary", ArtifactTag::Final).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "the summary");
        assert_eq!(store.status("doc").unwrap(), ArtifactStatus::Final);
    }

    #[test]
    fn persist_partial_is_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        store.persist("doc", "halfway", ArtifactTag::Partial).unwrap();
        assert_eq!(
            store.load("doc").unwrap().unwrap(),
            "UNFINISHED DOC halfway"
        );
        assert_eq!(store.status("doc").unwrap(), ArtifactStatus::Partial);
    }

    #[test]
    fn persist_overwrites_never_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        store.persist("doc", "first", ArtifactTag::Partial).unwrap();
        store.persist("doc", "second", ArtifactTag::Partial).unwrap();
        assert_eq!(store.load("doc").unwrap().unwrap(), "UNFINISHED DOC second");

        // Idempotent: same input, same content.
        store.persist("doc", "second", ArtifactTag::Partial).unwrap();
        assert_eq!(store.load("doc").unwrap().unwrap(), "UNFINISHED DOC second");
    }

    #[test]
    fn final_write_replaces_partial() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        store.persist("doc", "halfway", ArtifactTag::Partial).unwrap();
        store.persist("doc", "complete", ArtifactTag::Final).unwrap();
        assert_eq!(store.load("doc").unwrap().unwrap(), "complete");
        assert_eq!(store.status("doc").unwrap(), ArtifactStatus::Final);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        store.persist("doc", "text", ArtifactTag::Final).unwrap();
        assert!(!dir.path().join(".doc.txt.tmp").exists());
    }

    #[test]
    fn missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        assert!(store.load("nope").unwrap().is_none());
        assert_eq!(store.status("nope").unwrap(), ArtifactStatus::Missing);
    }

    #[test]
    fn progress_fraction() {
        assert_eq!(progress(0, 4), 0.0);
        assert_eq!(progress(2, 4), 0.5);
        assert_eq!(progress(4, 4), 1.0);
        assert_eq!(progress(0, 0), 1.0);
    }
}
