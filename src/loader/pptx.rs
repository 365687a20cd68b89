//! PPTX loader, grounded on the teacher's `parser.rs::parse_pptx`: one `File`
//! per slide, ordered by slide number, with text runs parsed from `<a:t>`
//! elements inside `<a:p>` paragraphs.

use std::io::Read;
use std::path::Path;

use crate::types::{ContentType, File};

use super::docx::extract_tagged_text;
use super::{file_metadata, LoadMeta, Loader};

pub struct PptxLoader;

impl Loader for PptxLoader {
    fn load(&self, path: &Path, content_type: ContentType, meta: &LoadMeta) -> anyhow::Result<Vec<File>> {
        let zip_file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", path.display()))?;
        let mut archive = zip::ZipArchive::new(zip_file)
            .map_err(|e| anyhow::anyhow!("failed to read {} as a zip: {e}", path.display()))?;

        let mut slides: Vec<(usize, String)> = Vec::new();
        for i in 0..archive.len() {
            let Ok(mut entry) = archive.by_index(i) else {
                continue;
            };
            let name = entry.name().to_string();
            if !name.starts_with("ppt/slides/slide") || !name.ends_with(".xml") {
                continue;
            }
            let slide_num: usize = name
                .trim_start_matches("ppt/slides/slide")
                .trim_end_matches(".xml")
                .parse()
                .unwrap_or(0);

            let mut xml = String::new();
            if entry.read_to_string(&mut xml).is_ok() {
                let text = extract_tagged_text(&xml, "a:p", "a:t");
                if !text.is_empty() {
                    slides.push((slide_num, text));
                }
            }
        }

        if slides.is_empty() {
            anyhow::bail!("{} contains no extractable text", path.display());
        }
        slides.sort_by_key(|(num, _)| *num);

        let files = slides
            .into_iter()
            .map(|(num, text)| {
                let metadata = file_metadata(path, content_type, Some(num as i64), meta);
                File::new(text, metadata)
            })
            .collect();
        Ok(files)
    }
}
