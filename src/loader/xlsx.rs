//! XLSX loader, grounded on the teacher's `parser.rs::parse_spreadsheet`: one
//! `File` per sheet, rows joined as pipe-delimited text, empty rows skipped.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::types::{ContentType, File};

use super::{file_metadata, LoadMeta, Loader};

pub struct XlsxLoader;

impl Loader for XlsxLoader {
    fn load(&self, path: &Path, content_type: ContentType, meta: &LoadMeta) -> anyhow::Result<Vec<File>> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", path.display()))?;

        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
        if sheet_names.is_empty() {
            anyhow::bail!("{} has no sheets", path.display());
        }

        let mut files = Vec::new();
        for (i, sheet_name) in sheet_names.iter().enumerate() {
            let Ok(range) = workbook.worksheet_range(sheet_name) else {
                continue;
            };
            if range.is_empty() {
                continue;
            }

            let mut sheet_text = String::new();
            for row in range.rows() {
                let cells: Vec<String> = row.iter().map(cell_to_string).collect();
                if cells.iter().all(|c| c.is_empty()) {
                    continue;
                }
                sheet_text.push_str(&cells.join(" | "));
                sheet_text.push('\n');
            }
            if sheet_text.trim().is_empty() {
                continue;
            }

            let metadata = file_metadata(path, content_type, Some(i as i64 + 1), meta);
            files.push(File::new(sheet_text, metadata));
        }

        if files.is_empty() {
            anyhow::bail!("{} contains no extractable rows", path.display());
        }
        Ok(files)
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                format!("{f:.4}").trim_end_matches('0').trim_end_matches('.').to_string()
            }
        }
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#ERR:{e:?}"),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}
