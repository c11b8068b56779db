//! Document discovery and pending-set computation.
//!
//! Finds source documents under a directory tree and decides which still
//! need a summarization job: those with no artifact at all, and those whose
//! artifact is still tagged unfinished (the job died partway and should be
//! rerun).
//!
//! Keep the artifacts directory outside the source tree — artifacts are
//! plain `.txt` files and would otherwise be rediscovered as documents.

use crate::pipeline::persistence::{ArtifactStatus, ArtifactStore};
use std::path::{Path, PathBuf};

/// File extensions treated as pre-extracted document text.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Recursively find document files under `dir`, sorted for deterministic
/// processing order. Hidden files and directories are skipped.
pub fn find_documents(dir: &Path) -> Result<Vec<PathBuf>, String> {
    if !dir.exists() {
        return Err(format!("Source directory {} does not exist", dir.display()));
    }
    if !dir.is_dir() {
        return Err(format!("{} is not a directory", dir.display()));
    }

    let mut documents = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current)
            .map_err(|e| format!("Failed to read {}: {e}", current.display()))?;
        for entry in entries {
            let entry = entry.map_err(|e| format!("Failed to read entry: {e}"))?;
            let path = entry.path();
            if is_hidden(&path) {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
            } else if is_document(&path) {
                documents.push(path);
            }
        }
    }

    documents.sort();
    Ok(documents)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            DOCUMENT_EXTENSIONS
                .iter()
                .any(|d| ext.eq_ignore_ascii_case(d))
        })
}

/// Document id for a source path: the file stem.
pub fn doc_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string())
}

/// Documents that still need processing: artifact missing or still partial.
pub fn pending_documents(
    documents: &[PathBuf],
    store: &ArtifactStore,
) -> Result<Vec<PathBuf>, String> {
    let mut pending = Vec::new();
    for doc in documents {
        if store.status(&doc_id_for(doc))? != ArtifactStatus::Final {
            pending.push(doc.clone());
        }
    }
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::persistence::ArtifactTag;

    fn touch(path: &Path) {
        std::fs::write(path, "valve pump sensor").unwrap();
    }

    #[test]
    fn finds_documents_recursively_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        touch(&dir.path().join("b.txt"));
        touch(&dir.path().join("a.md"));
        touch(&dir.path().join("sub").join("c.txt"));
        touch(&dir.path().join("ignored.pdf"));

        let docs = find_documents(dir.path()).unwrap();
        let names: Vec<String> = docs.iter().map(|p| doc_id_for(p)).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn hidden_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(".hidden.txt"));
        std::fs::create_dir(dir.path().join(".cache")).unwrap();
        touch(&dir.path().join(".cache").join("inner.txt"));
        touch(&dir.path().join("visible.txt"));

        let docs = find_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(doc_id_for(&docs[0]), "visible");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = find_documents(Path::new("/definitely/not/here")).unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn pending_excludes_finished_documents() {
        let src = tempfile::tempdir().unwrap();
        let art = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(art.path()).unwrap();

        touch(&src.path().join("finished.txt"));
        touch(&src.path().join("halfway.txt"));
        touch(&src.path().join("untouched.txt"));

        store
            .persist("finished", "complete summary", ArtifactTag::Final)
            .unwrap();
        store
            .persist("halfway", "partial summary", ArtifactTag::Partial)
            .unwrap();

        let docs = find_documents(src.path()).unwrap();
        let pending = pending_documents(&docs, &store).unwrap();
        let names: Vec<String> = pending.iter().map(|p| doc_id_for(p)).collect();
        assert_eq!(names, vec!["halfway", "untouched"]);
    }
}
