//! Plain-text formats (txt, text, csv, tsv): read as-is, one `File` per path.
//! Grounded on the original's `CSVLoader`, which is just `BaseLoader` wired to
//! langchain's `CSVLoader` with no format-specific post-processing.

use std::path::Path;

use crate::types::File;

use super::{file_metadata, LoadMeta, Loader};

pub struct TextLoader;

impl Loader for TextLoader {
    fn load(&self, path: &Path, content_type: crate::types::ContentType, meta: &LoadMeta) -> anyhow::Result<Vec<File>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let metadata = file_metadata(path, content_type, None, meta);
        Ok(vec![File::new(content, metadata)])
    }
}
