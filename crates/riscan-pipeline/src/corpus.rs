//! Loading documents from disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use riscan_core::{Document, RiError};
use sha2::{Digest, Sha256};

/// Extensions read as plain-text documents.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md"];

/// A document together with where it came from.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    /// Identifier (file stem) and text.
    pub document: Document,
    /// File the text was read from.
    pub path: PathBuf,
    /// Hex SHA-256 of the text.
    pub content_hash: String,
}

/// Load a single document file. The id is the file stem.
///
/// # Errors
///
/// Returns [`RiError::FileNotFound`] if `path` does not exist and
/// [`RiError::Io`] if it cannot be read as UTF-8 text.
pub fn load_document(path: &Path) -> Result<CorpusDocument, RiError> {
    if !path.exists() {
        return Err(RiError::FileNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(CorpusDocument {
        content_hash: content_hash(&text),
        document: Document::new(id, text),
        path: path.to_path_buf(),
    })
}

/// Load every `.txt` / `.md` file under `root`, or `root` itself if it is a
/// file.
///
/// Directories are walked with `.gitignore` rules applied. Documents come
/// back sorted by path. Unreadable files and files whose stem repeats an
/// earlier document's id are skipped with a warning.
///
/// # Errors
///
/// Returns [`RiError::FileNotFound`] if `root` does not exist.
///
/// # Examples
///
/// ```
/// use riscan_pipeline::corpus::load_documents;
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("pad-001.txt"), "Levees were raised.").unwrap();
/// std::fs::write(dir.path().join("notes.csv"), "ignored").unwrap();
///
/// let docs = load_documents(dir.path()).unwrap();
/// assert_eq!(docs.len(), 1);
/// assert_eq!(docs[0].document.id, "pad-001");
/// ```
pub fn load_documents(root: &Path) -> Result<Vec<CorpusDocument>, RiError> {
    if !root.exists() {
        return Err(RiError::FileNotFound(root.to_path_buf()));
    }
    if root.is_file() {
        return Ok(vec![load_document(root)?]);
    }

    let mut paths = Vec::new();
    for entry in ignore::WalkBuilder::new(root).build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() || !is_document(entry.path()) {
            continue;
        }
        paths.push(entry.into_path());
    }
    paths.sort();

    let mut seen = HashSet::new();
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let doc = match load_document(&path) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping document");
                continue;
            }
        };
        if !seen.insert(doc.document.id.clone()) {
            tracing::warn!(
                path = %path.display(),
                id = %doc.document.id,
                "duplicate document id, skipping"
            );
            continue;
        }
        documents.push(doc);
    }

    tracing::info!(root = %root.display(), documents = documents.len(), "loaded corpus");
    Ok(documents)
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| DOCUMENT_EXTENSIONS.iter().any(|d| e.eq_ignore_ascii_case(d)))
}

/// Hex SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_root_is_an_error() {
        let err = load_documents(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, RiError::FileNotFound(_)));
    }

    #[test]
    fn single_file_root_loads_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        std::fs::write(&path, "# Drainage\nCulverts were resized.").unwrap();

        let docs = load_documents(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document.id, "report");
        assert_eq!(docs[0].content_hash, content_hash("# Drainage\nCulverts were resized."));
    }

    #[test]
    fn nested_documents_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/zeta.txt"), "z").unwrap();
        std::fs::write(dir.path().join("alpha.TXT"), "a").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let docs = load_documents(dir.path()).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.document.id.as_str()).collect();
        assert_eq!(ids, ["alpha", "zeta"]);
    }

    #[test]
    fn duplicate_stems_keep_the_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pad.md"), "markdown").unwrap();
        std::fs::write(dir.path().join("pad.txt"), "text").unwrap();

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document.text, "markdown");
    }

    #[test]
    fn non_utf8_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.txt"), [0xffu8, 0xfe, 0x00]).unwrap();
        std::fs::write(dir.path().join("good.txt"), "ok").unwrap();

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document.id, "good");
    }
}
