//! Fixed-token-window chunker (spec §4.1). The tokenizer is injected rather
//! than hardcoded — the source's own default (one token per character) is a
//! placeholder, so callers that care about real token boundaries can swap in
//! their own without touching the splitting logic.

use std::sync::Arc;

use crate::types::{Chunk, ChunkMetadata, File};

/// Splits text into tokens and rejoins them. The chunker only ever asks for
/// `tokenize` + concatenation, so any implementation whose tokens concatenate
/// back to the original text is a drop-in replacement.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// The default tokenizer: one token per Unicode scalar value. Deliberately
/// naive — real deployments should inject a tokenizer matching their model.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerCharTokenizer;

impl Tokenizer for PerCharTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.chars().map(|c| c.to_string()).collect()
    }
}

/// Fixed-token-window splitter with overlap (spec §4.1).
#[derive(Clone)]
pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// `chunk_overlap` must be `< chunk_size`; the caller validates this via
    /// `Config::validate` before construction.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, chunk_size: usize, chunk_overlap: usize) -> Self {
        assert!(chunk_overlap < chunk_size, "chunk_overlap must be < chunk_size");
        Self {
            tokenizer,
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn with_default_tokenizer(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::new(Arc::new(PerCharTokenizer), chunk_size, chunk_overlap)
    }

    /// Split `file.page_content` into ordered, overlapping `Chunk`s. Empty
    /// input yields an empty sequence.
    pub fn chunk_file(&self, file: &File) -> Vec<Chunk> {
        let tokens = self.tokenizer.tokenize(&file.page_content);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut chunk_idx = 0u32;
        let step = self.chunk_size - self.chunk_overlap;

        while start < tokens.len() {
            let end = (start + self.chunk_size).min(tokens.len());
            let text: String = tokens[start..end].concat();
            let metadata = ChunkMetadata::from_file(&file.metadata, chunk_idx, file.id.clone());
            chunks.push(Chunk::new(text, metadata));
            chunk_idx += 1;

            if end == tokens.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentType, FileMetadata};

    fn file_with(content: &str) -> File {
        File::new(
            content.to_string(),
            FileMetadata {
                content_type: ContentType::Text,
                filename: "doc.txt".into(),
                page_number: None,
                uri: "doc.txt".into(),
                private: false,
            },
        )
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunker = Chunker::with_default_tokenizer(1000, 200);
        assert!(chunker.chunk_file(&file_with("")).is_empty());
    }

    #[test]
    fn chunking_boundaries_match_spec_example() {
        // 2400 chars, chunk_size=1000, chunk_overlap=200 => chunks of 1000,
        // 1000, 600 with chunk_idx = 0,1,2.
        let content = "x".repeat(2400);
        let chunker = Chunker::with_default_tokenizer(1000, 200);
        let chunks = chunker.chunk_file(&file_with(&content));

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].page_content.len(), 1000);
        assert_eq!(chunks[1].page_content.len(), 1000);
        assert_eq!(chunks[2].page_content.len(), 600);
        assert_eq!(chunks[0].metadata.chunk_idx, 0);
        assert_eq!(chunks[1].metadata.chunk_idx, 1);
        assert_eq!(chunks[2].metadata.chunk_idx, 2);
    }

    #[test]
    fn chunk_idx_is_sequential_and_document_id_is_inherited() {
        let content = "y".repeat(50);
        let chunker = Chunker::with_default_tokenizer(20, 5);
        let file = file_with(&content);
        let chunks = chunker.chunk_file(&file);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.chunk_idx, i as u32);
            assert_eq!(chunk.metadata.document_id, file.id);
        }
    }

    #[test]
    fn chunk_id_is_content_addressed() {
        let chunker = Chunker::with_default_tokenizer(1000, 200);
        let chunks = chunker.chunk_file(&file_with("hello world"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].id,
            crate::ids::compute_mdhash_id("hello world", "chunk-")
        );
    }
}
