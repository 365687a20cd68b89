//! PDF loader, grounded on the teacher's `parser.rs::parse_pdf` use of
//! `pdf-extract` for text extraction (the OCR fallback path is dropped; it
//! depends on Windows-only APIs the teacher itself gates behind `cfg(windows)`).

use std::path::Path;

use crate::types::{ContentType, File};

use super::{file_metadata, LoadMeta, Loader};

pub struct PdfLoader;

impl Loader for PdfLoader {
    fn load(&self, path: &Path, content_type: ContentType, meta: &LoadMeta) -> anyhow::Result<Vec<File>> {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let text = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| anyhow::anyhow!("failed to extract text from {}: {e}", path.display()))?;
        let cleaned = text
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let metadata = file_metadata(path, content_type, Some(1), meta);
        Ok(vec![File::new(cleaned, metadata)])
    }
}
