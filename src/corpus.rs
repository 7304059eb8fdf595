//! Document corpus manager.
//!
//! The corpus is a flat directory of legal documents (PDF, DOCX, TXT, DOC,
//! RTF). [`Corpus`] uploads, lists and deletes files in it, and loads the
//! extracted text of every file for indexing. The directory is created on
//! first access; it is never assumed to exist.
//!
//! Every filename that comes from a client is reduced to its base name
//! before touching the filesystem, so `../../etc/passwd` can only ever
//! address `passwd` inside the corpus directory.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{LegalRagError, Result};
use crate::extract::extract_text;

/// Extensions accepted by [`Corpus::upload`].
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "doc", "rtf"];

const SIZE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

/// One entry of [`Corpus::list`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentInfo {
    pub name: String,
    pub size: u64,
    pub size_formatted: String,
}

/// Extracted text of one corpus file, ready for chunking.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Corpus {
    dir: PathBuf,
}

impl Corpus {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            LegalRagError::Storage(format!(
                "cannot create document directory {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    /// Stores `content` under the sanitized `filename`, overwriting any file
    /// of the same name. Returns the stored name.
    ///
    /// The caller is responsible for rebuilding the retrieval index.
    pub fn upload(&self, filename: &str, content: &[u8]) -> Result<String> {
        let name = sanitize_filename(filename)?;
        let ext = extension_of(&name);
        if !is_allowed_extension(&ext) {
            return Err(LegalRagError::UnsupportedType(format!(
                "File type .{} is not allowed. Allowed types: {}",
                ext,
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        self.ensure_dir()?;
        let path = self.dir.join(&name);
        std::fs::write(&path, content).map_err(|e| {
            LegalRagError::Storage(format!("failed to save {}: {}", name, e))
        })?;

        info!(document = %name, bytes = content.len(), "uploaded document");
        Ok(name)
    }

    /// Lists the regular files in the corpus, sorted by name.
    pub fn list(&self) -> Result<Vec<DocumentInfo>> {
        self.ensure_dir()?;

        let mut documents = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                LegalRagError::Storage(format!("failed to read document directory: {}", e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry
                .metadata()
                .map_err(|e| LegalRagError::Storage(e.to_string()))?
                .len();
            documents.push(DocumentInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                size,
                size_formatted: format_size(size),
            });
        }

        documents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(documents)
    }

    /// Removes the file named by the base name of `filename`.
    ///
    /// Fails with [`LegalRagError::NotFound`] without touching the
    /// filesystem if no such regular file exists.
    pub fn delete(&self, filename: &str) -> Result<String> {
        let name = sanitize_filename(filename)
            .map_err(|_| LegalRagError::NotFound(format!("File {} not found", filename)))?;
        self.ensure_dir()?;

        let path = self.dir.join(&name);
        if !path.is_file() {
            return Err(LegalRagError::NotFound(format!("File {} not found", name)));
        }

        std::fs::remove_file(&path).map_err(|e| {
            LegalRagError::Storage(format!("failed to delete {}: {}", name, e))
        })?;

        info!(document = %name, "deleted document");
        Ok(name)
    }

    /// Reads and extracts the text of every regular file in the corpus.
    ///
    /// Files that fail extraction or contain no text are skipped with a
    /// warning; a corpus with nothing indexable yields an empty vector.
    pub fn load_documents(&self) -> Result<Vec<LoadedDocument>> {
        let mut loaded = Vec::new();
        for info in self.list()? {
            let path = self.dir.join(&info.name);
            let bytes = std::fs::read(&path).map_err(|e| {
                LegalRagError::Storage(format!("failed to read {}: {}", info.name, e))
            })?;

            let ext = extension_of(&info.name);
            match extract_text(&bytes, &ext) {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(document = %info.name, chars = text.len(), "loaded document");
                    loaded.push(LoadedDocument {
                        name: info.name,
                        text,
                    });
                }
                Ok(_) => warn!(document = %info.name, "skipping document with no text"),
                Err(e) => warn!(document = %info.name, error = %e, "skipping unreadable document"),
            }
        }
        Ok(loaded)
    }
}

/// Reduces a client-supplied name to its final path component.
///
/// Both `/` and `\` are treated as separators. Names that reduce to nothing,
/// `.` or `..` are rejected.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(LegalRagError::InvalidInput(format!(
            "invalid filename: {:?}",
            filename
        )));
    }
    Ok(base.to_string())
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_allowed_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// Human-readable size: divide by 1024 while the value is at least 1024,
/// up to TB, printed with two decimals.
///
/// ```rust
/// use legal_rag::corpus::format_size;
///
/// assert_eq!(format_size(0), "0.00 B");
/// assert_eq!(format_size(2048), "2.00 KB");
/// assert_eq!(format_size(1_572_864), "1.50 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, SIZE_UNITS[unit])
}
