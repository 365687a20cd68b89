//! DOCX loader, grounded on the teacher's `parser.rs::parse_docx` (DOCX is a
//! zip of XML parts; text runs live in `<w:t>` elements inside `<w:p>`
//! paragraphs).

use std::io::Read;
use std::path::Path;

use crate::types::{ContentType, File};

use super::{file_metadata, LoadMeta, Loader};

pub struct DocxLoader;

impl Loader for DocxLoader {
    fn load(&self, path: &Path, content_type: ContentType, meta: &LoadMeta) -> anyhow::Result<Vec<File>> {
        let zip_file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", path.display()))?;
        let mut archive = zip::ZipArchive::new(zip_file)
            .map_err(|e| anyhow::anyhow!("failed to read {} as a zip: {e}", path.display()))?;

        let mut xml_content = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| anyhow::anyhow!("{} missing word/document.xml: {e}", path.display()))?
            .read_to_string(&mut xml_content)
            .map_err(|e| anyhow::anyhow!("failed to read document.xml: {e}"))?;

        let text = extract_tagged_text(&xml_content, "w:p", "w:t");
        if text.is_empty() {
            anyhow::bail!("{} contains no extractable text", path.display());
        }

        let metadata = file_metadata(path, content_type, None, meta);
        Ok(vec![File::new(text, metadata)])
    }
}

/// Walks `paragraph_tag` blocks and concatenates the text inside each
/// `text_tag` element they contain, one paragraph per line.
pub(super) fn extract_tagged_text(xml: &str, paragraph_tag: &str, text_tag: &str) -> String {
    let p_open = format!("<{paragraph_tag}");
    let p_close = format!("</{paragraph_tag}>");
    let t_open = format!("<{text_tag}");
    let t_close = format!("</{text_tag}>");

    let mut result = String::new();
    let mut pos = 0;

    while pos < xml.len() {
        let Some(p_start) = xml[pos..].find(&p_open) else {
            break;
        };
        let abs_p_start = pos + p_start;
        let p_end = xml[abs_p_start..]
            .find(&p_close)
            .map(|e| abs_p_start + e + p_close.len())
            .unwrap_or(xml.len());

        let paragraph = &xml[abs_p_start..p_end];
        let mut para_text = String::new();
        let mut t_pos = 0;

        while t_pos < paragraph.len() {
            let Some(t_start) = paragraph[t_pos..].find(&t_open) else {
                break;
            };
            let abs_t_start = t_pos + t_start;
            let Some(tag_end) = paragraph[abs_t_start..].find('>') else {
                break;
            };
            let content_start = abs_t_start + tag_end + 1;
            match paragraph[content_start..].find(&t_close) {
                Some(t_end) => {
                    para_text.push_str(&paragraph[content_start..content_start + t_end]);
                    t_pos = content_start + t_end + t_close.len();
                }
                None => t_pos = content_start,
            }
        }

        if !para_text.is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(&para_text);
        }

        pos = p_end;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_paragraphs_in_order() {
        let xml = "<w:p><w:r><w:t>Hello</w:t></w:r></w:p><w:p><w:r><w:t>World</w:t></w:r></w:p>";
        assert_eq!(extract_tagged_text(xml, "w:p", "w:t"), "Hello\nWorld");
    }
}
