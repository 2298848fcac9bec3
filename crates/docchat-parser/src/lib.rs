//! DocChat Parser - Document loading and chunk splitting
//!
//! Supports loading of:
//! - PDF documents (one page record per PDF page)
//! - Plain text files (anything that is not a PDF)
//!
//! Each loader implements the `DocumentLoader` trait and produces a
//! `SourceDocument` that the `splitter` turns into overlapping chunks.

pub mod pdf;
pub mod splitter;

pub use pdf::PdfLoader;
pub use splitter::{RecursiveCharacterSplitter, SplitterConfig};

use docchat_core::{DocChatError, SourceDocument, SourcePage};
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while loading a document
#[derive(Error, Debug)]
pub enum ParserError {
    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PDF parsing error
    #[error("PDF parsing error in {path}: {reason}")]
    PdfError { path: String, reason: String },

    /// File is encrypted and cannot be parsed
    #[error("File is encrypted and requires a password: {0}")]
    EncryptedFile(String),

    /// File is corrupted or malformed
    #[error("File is corrupted or malformed: {path}: {reason}")]
    CorruptedFile { path: String, reason: String },

    /// Encoding error
    #[error("Text encoding error in {path}: {reason}")]
    EncodingError { path: String, reason: String },

    /// Chunk splitter settings are unusable
    #[error("Invalid splitter configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

impl ParserError {
    fn path(&self) -> Option<&str> {
        match self {
            Self::IoError { path, .. }
            | Self::PdfError { path, .. }
            | Self::CorruptedFile { path, .. }
            | Self::EncodingError { path, .. }
            | Self::EncryptedFile(path) => Some(path.as_str()),
            Self::InvalidConfig(_) => None,
        }
    }
}

impl From<ParserError> for DocChatError {
    fn from(err: ParserError) -> Self {
        match err {
            ParserError::InvalidConfig(msg) => DocChatError::Config(msg),
            other => DocChatError::UnsupportedOrCorruptFile {
                path: other.path().unwrap_or("<unknown>").to_string(),
                reason: other.to_string(),
            },
        }
    }
}

// ============================================================================
// File Types
// ============================================================================

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    PlainText,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            _ => Self::PlainText,
        }
    }

    /// Detect file type from path; files without an extension are text
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::PlainText)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::PlainText => write!(f, "text"),
        }
    }
}

// ============================================================================
// Loader Trait
// ============================================================================

/// Trait for document loaders
pub trait DocumentLoader: Send + Sync {
    /// Load a document from a file path
    fn load(&self, path: &Path) -> Result<SourceDocument>;

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Check if this loader can handle a file type
    fn can_load(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

/// Plain text loader: the whole file becomes one page without a number
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> Result<SourceDocument> {
        let display = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: display.clone(),
            source: e,
        })?;

        let text = String::from_utf8(bytes).map_err(|e| ParserError::EncodingError {
            path: display.clone(),
            reason: e.to_string(),
        })?;

        Ok(SourceDocument::new(display).with_page(SourcePage::new(text, None)))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::PlainText]
    }
}

// ============================================================================
// Loader Registry
// ============================================================================

/// Registry of available loaders
pub struct LoaderRegistry {
    loaders: Vec<Box<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    /// Registry with the PDF and plain text loaders
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PdfLoader::new());
        registry.register(TextLoader);
        registry
    }

    /// Register a loader
    pub fn register<L: DocumentLoader + 'static>(&mut self, loader: L) {
        self.loaders.push(Box::new(loader));
    }

    /// Find a loader for a file type
    pub fn find_loader(&self, file_type: FileType) -> Option<&dyn DocumentLoader> {
        self.loaders
            .iter()
            .find(|l| l.can_load(file_type))
            .map(|l| l.as_ref())
    }

    /// Load a file using the appropriate loader
    pub fn load(&self, path: &Path) -> Result<SourceDocument> {
        let file_type = FileType::from_path(path);

        let loader = self
            .find_loader(file_type)
            .ok_or_else(|| ParserError::CorruptedFile {
                path: path.display().to_string(),
                reason: format!("no loader registered for {file_type}"),
            })?;

        let doc = loader.load(path)?;
        tracing::debug!(
            path = %doc.path,
            file_type = %file_type,
            pages = doc.pages.len(),
            chars = doc.char_count(),
            "Loaded document"
        );
        Ok(doc)
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_extension("pdf"), FileType::Pdf);
        assert_eq!(FileType::from_extension("PDF"), FileType::Pdf);
        assert_eq!(FileType::from_extension("txt"), FileType::PlainText);
        assert_eq!(FileType::from_extension("md"), FileType::PlainText);
        assert_eq!(
            FileType::from_path(Path::new("README")),
            FileType::PlainText
        );
    }

    #[test]
    fn test_text_loader_single_page() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "Hello world.\n\nSecond paragraph.").unwrap();

        let doc = LoaderRegistry::with_defaults().load(file.path()).unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].page_number, None);
        assert!(doc.pages[0].text.starts_with("Hello world."));
        assert_eq!(doc.path, file.path().display().to_string());
    }

    #[test]
    fn test_text_loader_rejects_invalid_utf8() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(&[0xff, 0xfe, 0x00, 0x80]).unwrap();

        let err = LoaderRegistry::with_defaults().load(file.path()).unwrap_err();
        assert!(matches!(err, ParserError::EncodingError { .. }));

        let core: DocChatError = err.into();
        assert_eq!(core.code(), "UNSUPPORTED_OR_CORRUPT_FILE");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = LoaderRegistry::with_defaults()
            .load(Path::new("/definitely/not/here.txt"))
            .unwrap_err();
        assert!(matches!(err, ParserError::IoError { .. }));

        match DocChatError::from(err) {
            DocChatError::UnsupportedOrCorruptFile { path, .. } => {
                assert_eq!(path, "/definitely/not/here.txt")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_registry_picks_pdf_loader() {
        let registry = LoaderRegistry::with_defaults();
        assert!(registry
            .find_loader(FileType::Pdf)
            .unwrap()
            .can_load(FileType::Pdf));
        assert!(LoaderRegistry::new().find_loader(FileType::Pdf).is_none());
    }
}
