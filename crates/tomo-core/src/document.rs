//! Loaded documents and their derived names.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

/// A loaded document: a stable name plus its immutable text buffer.
///
/// Byte offsets into `text` are the coordinate system for chapter maps and pages.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    name: String,
    source: Option<PathBuf>,
    #[serde(skip)]
    text: String,
}

impl Document {
    /// Document loaded from `source`; the name is derived from the path.
    pub fn from_source(source: &Path, text: String) -> Self {
        Self {
            name: derive_name(source),
            source: Some(source.to_path_buf()),
            text,
        }
    }

    /// In-memory document with an explicit name.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            text: text.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Total length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Derive a directory-safe document name from its source path.
///
/// `<sanitized stem>-<first 8 hex of sha256(canonical path)>`: stable across
/// runs for the same file, distinct for same-named files in different places.
pub fn derive_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let canonical = std::fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    let hash = hex::encode(digest);
    format!("{}-{}", sanitized, &hash[..8])
}

/// Largest char boundary in `text` that is `<= index`.
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}
