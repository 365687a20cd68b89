//! HTML loader: strips tags and scripts/styles to plain text, mirroring the
//! original's use of langchain's `UnstructuredHTMLLoader` (full DOM parsing
//! traded for a regex-based strip, since no HTML engine is in the stack).

use std::path::Path;

use regex::Regex;

use crate::types::{ContentType, File};

use super::{file_metadata, LoadMeta, Loader};

pub struct HtmlLoader;

impl Loader for HtmlLoader {
    fn load(&self, path: &Path, content_type: ContentType, meta: &LoadMeta) -> anyhow::Result<Vec<File>> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let text = strip_html(&raw);
        let metadata = file_metadata(path, content_type, None, meta);
        Ok(vec![File::new(text, metadata)])
    }
}

fn strip_html(raw: &str) -> String {
    let script_or_style = Regex::new(r"(?is)<(script|style)[^>]*>.*?</\1>").unwrap();
    let without_script = script_or_style.replace_all(raw, " ");
    let tag = Regex::new(r"(?s)<[^>]+>").unwrap();
    let without_tags = tag.replace_all(&without_script, " ");
    let whitespace = Regex::new(r"[ \t]+").unwrap();
    without_tags
        .lines()
        .map(|line| whitespace.replace_all(line.trim(), " ").to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_script_blocks() {
        let html = "<html><head><style>.a{}</style></head><body><script>alert(1)</script><p>Hello <b>World</b></p></body></html>";
        let text = strip_html(html);
        assert_eq!(text, "Hello World");
    }
}
