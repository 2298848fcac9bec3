//! Recursive character chunk splitter
//!
//! Windows are at most `chunk_size` characters long and start roughly
//! `chunk_size - chunk_overlap` characters apart. A window end is pulled back
//! to the best natural break inside it, in order of preference: paragraph
//! break, line break, sentence end, whitespace. All offsets count `char`s.

use docchat_core::{Chunk, ChunkMetadata, SourceDocument};

use crate::{ParserError, Result};

/// Configuration for chunk splitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,

    /// Characters shared by adjacent chunks
    pub chunk_overlap: usize,

    /// Record each chunk's offset within its page
    pub record_start_index: bool,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            record_start_index: true,
        }
    }
}

impl SplitterConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        }
    }

    /// Reject sizes that cannot make progress
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ParserError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ParserError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits pages into overlapping chunks that carry page provenance
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    config: SplitterConfig,
}

impl RecursiveCharacterSplitter {
    pub fn new(config: SplitterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split every page of a document, in page order
    pub fn split_document(&self, doc: &SourceDocument) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = doc
            .pages
            .iter()
            .flat_map(|page| {
                self.split_text(&page.text)
                    .into_iter()
                    .map(move |(start_index, text)| {
                        Chunk::new(
                            text,
                            ChunkMetadata {
                                source: doc.path.clone(),
                                page: page.page_number,
                                start_index,
                            },
                        )
                    })
            })
            .collect();

        tracing::debug!(
            source = %doc.path,
            pages = doc.pages.len(),
            chunks = chunks.len(),
            "Split document"
        );
        chunks
    }

    /// Split one text into `(start_index, chunk_text)` pairs
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let step = size - overlap;

        let mut out = Vec::new();
        if n <= size {
            self.push_trimmed(&chars, 0, n, &mut out);
            return out;
        }

        let mut start = 0;
        let mut prev_end: Option<usize> = None;
        while start < n {
            let hard_end = (start + size).min(n);
            // A cut must reach past the previous chunk's overlap tail
            let floor = match prev_end {
                Some(prev) => (start + overlap).max(prev + overlap),
                None => start + overlap,
            };
            let end = if hard_end < n {
                find_break(&chars, floor, hard_end)
            } else {
                n
            };
            self.push_trimmed(&chars, start, end, &mut out);
            prev_end = Some(end);

            let target = start + step;
            if end == n && target >= n {
                break;
            }

            let next = if end >= target {
                target
            } else {
                end.saturating_sub(overlap).max(start + 1)
            };
            // Start on a word boundary inside the chunk just emitted, if there is one
            start = (next..end)
                .find(|&i| chars[i - 1].is_whitespace())
                .unwrap_or(next);
        }

        out
    }

    fn push_trimmed(
        &self,
        chars: &[char],
        start: usize,
        end: usize,
        out: &mut Vec<(usize, String)>,
    ) {
        let window = &chars[start..end];
        let Some(first) = window.iter().position(|c| !c.is_whitespace()) else {
            return;
        };
        let last = window
            .iter()
            .rposition(|c| !c.is_whitespace())
            .unwrap_or(first);

        let text: String = window[first..=last].iter().collect();
        let start_index = if self.config.record_start_index {
            start + first
        } else {
            0
        };
        out.push((start_index, text));
    }
}

/// Best cut position in `(floor, hard_end]`; the chunk is `[.., cut)`
fn find_break(chars: &[char], floor: usize, hard_end: usize) -> usize {
    let candidates = || (floor + 1..=hard_end).rev();
    let n = chars.len();

    let paragraph = |c: usize| chars[c] == '\n' && c + 1 < n && chars[c + 1] == '\n';
    let line = |c: usize| chars[c] == '\n';
    let sentence = |c: usize| chars[c].is_whitespace() && matches!(chars[c - 1], '.' | '!' | '?');
    let space = |c: usize| chars[c].is_whitespace();

    candidates()
        .find(|&c| paragraph(c))
        .or_else(|| candidates().find(|&c| line(c)))
        .or_else(|| candidates().find(|&c| sentence(c)))
        .or_else(|| candidates().find(|&c| space(c)))
        .unwrap_or(hard_end)
}
