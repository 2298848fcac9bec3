//! Document ingestion: load, split, index
//!
//! Author: hephaex@gmail.com

use docchat_core::{display_file_name, DocChatError, IndexMode, RagConfig, Result};
use docchat_parser::{LoaderRegistry, RecursiveCharacterSplitter, SplitterConfig};
use docchat_vector::VectorIndex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of ingesting one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Source path recorded on every chunk
    pub source: String,

    /// File name shown to the user
    pub file_name: String,

    /// Page records produced by the loader
    pub pages: usize,

    /// Chunks embedded and stored
    pub chunks: usize,

    /// Index mode the chunks were stored under
    pub mode: IndexMode,
}

/// User-facing status line for an upload
pub fn upload_message(outcome: &Result<IngestReport>) -> String {
    match outcome {
        Ok(report) => format!(
            "Processed {} into {} chunks.",
            report.file_name, report.chunks
        ),
        Err(e) => format!("Error processing file: {e}"),
    }
}

/// Loads files and feeds their chunks into a vector index
pub struct IngestService {
    loaders: Arc<LoaderRegistry>,
    splitter: RecursiveCharacterSplitter,
    index: Arc<VectorIndex>,
}

impl IngestService {
    /// Build with the default loaders and a splitter sized from config
    pub fn new(index: Arc<VectorIndex>, config: &RagConfig) -> Result<Self> {
        let splitter = RecursiveCharacterSplitter::new(SplitterConfig::new(
            config.chunk_size,
            config.chunk_overlap,
        ))?;

        Ok(Self {
            loaders: Arc::new(LoaderRegistry::with_defaults()),
            splitter,
            index,
        })
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Load, split and index one file
    ///
    /// Nothing is written to the index unless loading and embedding both
    /// succeed.
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        let loaders = Arc::clone(&self.loaders);
        let owned: PathBuf = path.to_path_buf();
        let doc = tokio::task::spawn_blocking(move || loaders.load(&owned))
            .await
            .map_err(|e| DocChatError::Other(anyhow::anyhow!("loader task failed: {e}")))??;

        let chunks = self.splitter.split_document(&doc);
        tracing::debug!(
            source = %doc.path,
            pages = doc.pages.len(),
            chunks = chunks.len(),
            "Split document"
        );

        let stored = self.index.upsert(&chunks).await?;

        let report = IngestReport {
            file_name: display_file_name(&doc.path),
            source: doc.path,
            pages: doc.pages.len(),
            chunks: stored,
            mode: self.index.mode(),
        };
        tracing::info!(
            source = %report.source,
            chunks = report.chunks,
            mode = %report.mode,
            "Ingested document"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_vector::testing::KeywordEmbedding;
    use docchat_vector::InMemoryVectorStore;
    use std::io::Write;
    use tempfile::TempDir;

    fn service(mode: IndexMode) -> IngestService {
        let index = Arc::new(VectorIndex::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(KeywordEmbedding::new()),
            "ingest_test",
            mode,
        ));
        IngestService::new(index, &RagConfig::default()).unwrap()
    }

    fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    fn long_text() -> String {
        "abcd ".repeat(500)
    }

    #[tokio::test]
    async fn test_ingest_text_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", long_text().as_bytes());
        let service = service(IndexMode::Accumulate);

        let report = service.ingest(&path).await.unwrap();
        assert_eq!(report.file_name, "a.txt");
        assert_eq!(report.pages, 1);
        assert_eq!(report.chunks, 4);
        assert_eq!(service.index().point_count().await.unwrap(), 4);
        assert_eq!(
            upload_message(&Ok(report)),
            "Processed a.txt into 4 chunks."
        );
    }

    #[tokio::test]
    async fn test_accumulate_adds_sources() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.txt", long_text().as_bytes());
        let b = write_file(&dir, "b.txt", b"a short note about zebras");
        let service = service(IndexMode::Accumulate);

        let first = service.ingest(&a).await.unwrap();
        let second = service.ingest(&b).await.unwrap();
        assert_eq!(second.chunks, 1);
        assert_eq!(
            service.index().point_count().await.unwrap(),
            (first.chunks + second.chunks) as u64
        );

        let removed = service.index().delete_by_source(&second.source).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(service.index().point_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_ephemeral_replaces_on_reupload() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.txt", long_text().as_bytes());
        let service = service(IndexMode::Ephemeral);

        service.ingest(&a).await.unwrap();
        let report = service.ingest(&a).await.unwrap();
        assert_eq!(report.mode, IndexMode::Ephemeral);
        assert_eq!(
            service.index().point_count().await.unwrap(),
            report.chunks as u64
        );
    }

    #[tokio::test]
    async fn test_corrupt_pdf_reports_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "broken.pdf", b"not really a pdf");
        let service = service(IndexMode::Accumulate);

        let outcome = service.ingest(&path).await;
        let err = outcome.as_ref().unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_OR_CORRUPT_FILE");
        assert!(upload_message(&outcome).starts_with("Error processing file:"));
        assert_eq!(service.index().point_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_utf8_text_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.txt", &[0xff, 0xfe, 0x00, 0xc3]);
        let service = service(IndexMode::Accumulate);

        let err = service.ingest(&path).await.unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_OR_CORRUPT_FILE");
    }

    #[test]
    fn test_invalid_splitter_config_rejected() {
        let index = Arc::new(VectorIndex::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(KeywordEmbedding::new()),
            "c",
            IndexMode::Accumulate,
        ));
        let config = RagConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..RagConfig::default()
        };
        let err = IngestService::new(index, &config).err().unwrap();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
