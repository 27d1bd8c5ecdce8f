//! Plain-text document loading.
//!
//! Each `.txt` file under a directory is one document. A form feed (`\f`)
//! marks the start of a new page, which is how most PDF-to-text tools emit
//! page boundaries.
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};
use crate::metadata::{generate_document_id, DocumentMetadata};
use crate::types::StructuredText;

const PAGE_BREAK: char = '\u{000C}';

/// A loaded source document ready for chunking.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub document_id: String,
    pub path: PathBuf,
    pub metadata: DocumentMetadata,
    pub text: StructuredText,
}

#[derive(Debug, Default, Clone)]
pub struct DocumentLoader {
    limit: Option<usize>,
}

impl DocumentLoader {
    pub fn new() -> Self { Self::default() }

    /// Load at most `limit` files (after sorting by path).
    pub fn with_limit(limit: usize) -> Self { Self { limit: Some(limit) } }

    pub fn load_directory(&self, data_dir: &Path) -> Result<Vec<SourceDocument>> {
        if !data_dir.is_dir() {
            return Err(Error::NotFound(format!("data directory {}", data_dir.display())));
        }
        let mut files = list_txt_files(data_dir);
        if files.is_empty() {
            warn!(dir = %data_dir.display(), "no .txt files found");
            return Ok(Vec::new());
        }
        if let Some(limit) = self.limit.filter(|&l| l < files.len()) {
            info!(limit, "limiting to first files");
            files.truncate(limit);
        }
        let docs = files.iter().map(|p| self.load_file(p)).collect::<Result<Vec<_>>>()?;
        info!(documents = docs.len(), dir = %data_dir.display(), "documents loaded");
        Ok(docs)
    }

    pub fn load_file(&self, path: &Path) -> Result<SourceDocument> {
        let raw = read_file_content(path)?;
        let text = parse_pages(document_title(path), &raw);
        let metadata = DocumentMetadata::extract(&text.body);
        let document_id = generate_document_id(&path.to_string_lossy(), metadata.document_code.as_deref());
        debug!(path = %path.display(), document_id = %document_id, pages = text.page_breaks.len() + 1, "document read");
        Ok(SourceDocument { document_id, path: path.to_path_buf(), metadata, text })
    }
}

/// NFC-normalises `raw`, strips form feeds and records where each new page begins.
pub fn parse_pages(title: impl Into<String>, raw: &str) -> StructuredText {
    let normalized: String = raw.nfc().collect();
    let mut body = String::with_capacity(normalized.len());
    let mut page_breaks = Vec::new();
    for (i, page) in normalized.split(PAGE_BREAK).enumerate() {
        if i > 0 {
            if !body.is_empty() && !body.ends_with('\n') {
                body.push('\n');
            }
            page_breaks.push(body.len());
        }
        body.push_str(page);
    }
    StructuredText::new(title, body).with_page_breaks(page_breaks)
}

fn read_file_content(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => {
            let bytes = fs::read(path).map_err(|e| Error::Operation(format!("read {}: {e}", path.display())))?;
            warn!(path = %path.display(), "file is not valid UTF-8; decoding lossily");
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

fn document_title(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
        .collect();
    txt_files.sort();
    txt_files
}
