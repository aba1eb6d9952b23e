//! Text extraction from uploaded files.
//!
//! The pipeline core only ever sees plain text. A [`TextExtractor`] turns an
//! upload's bytes into that text; the [`ExtractorRegistry`] picks one by file
//! extension. Binary formats (PDF, DOCX, ...) are supported by registering an
//! extractor for their extension.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{RagError, Result};

/// Converts the bytes of one uploaded file into plain text.
pub trait TextExtractor: Send + Sync {
    /// Extract plain text from `content`.
    fn extract(&self, filename: &str, content: &[u8]) -> Result<String>;
}

/// Extractor for formats that already are UTF-8 text.
///
/// Strips a leading byte-order mark and normalises line endings to `\n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8TextExtractor;

impl TextExtractor for Utf8TextExtractor {
    fn extract(&self, filename: &str, content: &[u8]) -> Result<String> {
        let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
        let text = std::str::from_utf8(content).map_err(|e| RagError::Extraction {
            filename: filename.to_string(),
            message: format!("content is not valid UTF-8: {e}"),
        })?;
        Ok(text.replace("\r\n", "\n"))
    }
}

/// Extensions handled by [`Utf8TextExtractor`] in the default registry.
const TEXT_EXTENSIONS: &[&str] =
    &["", "txt", "text", "md", "markdown", "rst", "csv", "tsv", "json", "html", "htm", "log"];

/// Maps lower-case file extensions to extractors.
#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn TextExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let utf8: Arc<dyn TextExtractor> = Arc::new(Utf8TextExtractor);
        let extractors =
            TEXT_EXTENSIONS.iter().map(|ext| ((*ext).to_string(), Arc::clone(&utf8))).collect();
        Self { extractors }
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&str> = self.extractors.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        f.debug_struct("ExtractorRegistry").field("extensions", &extensions).finish()
    }
}

impl ExtractorRegistry {
    /// A registry with no extractors.
    pub fn empty() -> Self {
        Self { extractors: HashMap::new() }
    }

    /// Register `extractor` for `extension` (without the leading dot).
    pub fn register(mut self, extension: &str, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractors.insert(extension.trim_start_matches('.').to_lowercase(), extractor);
        self
    }

    /// Returns `true` if an extractor is registered for `filename`'s extension.
    pub fn supports(&self, filename: &str) -> bool {
        self.extractors.contains_key(&extension_of(filename))
    }

    /// Extract plain text from an upload using its extension's extractor.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Extraction`] if no extractor handles the extension
    /// or the extractor rejects the content.
    pub fn extract(&self, filename: &str, content: &[u8]) -> Result<String> {
        let extension = extension_of(filename);
        let extractor = self.extractors.get(&extension).ok_or_else(|| RagError::Extraction {
            filename: filename.to_string(),
            message: format!("unsupported file type '.{extension}'"),
        })?;
        extractor.extract(filename, content)
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}
