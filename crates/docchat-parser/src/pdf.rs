//! PDF document loader using lopdf
//!
//! Produces one page record per page of the PDF page tree, numbered
//! from 1 the way the page tree numbers them.

use lopdf::Document;
use std::path::Path;

use crate::{DocumentLoader, FileType, ParserError, Result};
use docchat_core::{SourceDocument, SourcePage};

/// PDF document loader
///
/// Pages without text stay in the output so page numbers match the file.
#[derive(Debug, Default)]
pub struct PdfLoader;

impl PdfLoader {
    pub fn new() -> Self {
        Self
    }

    /// Extract per-page text from PDF bytes
    pub fn load_bytes(&self, path: &str, bytes: &[u8]) -> Result<SourceDocument> {
        let doc = Document::load_mem(bytes).map_err(|e| ParserError::PdfError {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(ParserError::EncryptedFile(path.to_string()));
        }

        let mut source = SourceDocument::new(path);
        for page_number in doc.get_pages().keys() {
            let text = doc
                .extract_text(&[*page_number])
                .map_err(|e| ParserError::CorruptedFile {
                    path: path.to_string(),
                    reason: format!("page {page_number}: {e}"),
                })?;

            if text.trim().is_empty() {
                tracing::debug!(path, page = page_number, "PDF page has no text");
            }
            source = source.with_page(SourcePage::new(text, Some(*page_number)));
        }

        Ok(source)
    }
}

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<SourceDocument> {
        let display = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: display.clone(),
            source: e,
        })?;

        self.load_bytes(&display, &bytes)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Dictionary, Object, Stream};

    fn create_test_pdf(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in page_texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_pages_numbered_from_one() {
        let bytes = create_test_pdf(&["First page", "Second page", "Third page"]);
        let doc = PdfLoader::new().load_bytes("report.pdf", &bytes).unwrap();

        assert_eq!(doc.path, "report.pdf");
        let numbers: Vec<_> = doc.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_blank_page_keeps_numbering() {
        let bytes = create_test_pdf(&["alpha", "", "gamma"]);
        let doc = PdfLoader::new().load_bytes("gaps.pdf", &bytes).unwrap();

        assert_eq!(doc.pages.len(), 3);
        assert!(doc.pages[1].text.trim().is_empty());
        assert_eq!(doc.pages[2].page_number, Some(3));
    }

    #[test]
    fn test_corrupt_bytes_rejected() {
        let err = PdfLoader::new()
            .load_bytes("broken.pdf", b"this is not a pdf")
            .unwrap_err();
        assert!(matches!(err, ParserError::PdfError { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two-pages.PDF");
        std::fs::write(&path, create_test_pdf(&["alpha", "beta"])).unwrap();

        let doc = crate::LoaderRegistry::with_defaults().load(&path).unwrap();
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[1].page_number, Some(2));
    }

    #[test]
    fn test_supported_types() {
        let loader = PdfLoader::new();
        assert!(loader.can_load(FileType::Pdf));
        assert!(!loader.can_load(FileType::PlainText));
    }
}
