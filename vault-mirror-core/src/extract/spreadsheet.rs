//! Spreadsheets explode into one front-matter document per data row.
//!
//! Declared tables win: every row of every table on a sheet becomes a document tagged
//! with the table's name. A sheet without tables uses its used range, first non-empty
//! row as header, and tags rows `not_assigned`. Numbering restarts at 1 on every sheet
//! and keeps counting across the tables of one sheet.

use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx};
use tracing::debug;

use crate::contract::{ExtractError, ExtractedDocument, ExtractionResult, Extractor};
use crate::vault_path::row_file_name;

pub const NOT_ASSIGNED_TAG: &str = "not_assigned";

const FORMAT: &str = "XLSX";

/// Backslash-escapes the front-matter delimiter and quotes.
pub fn escape_value(value: &str) -> String {
    value.replace(':', "\\:").replace('"', "\\\"")
}

/// Front matter for one row: `header: value` for as many pairs as both sides have,
/// then the origin tag.
pub fn row_front_matter<H, V>(headers: &[H], values: &[V], tag: &str) -> String
where
    H: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = String::from("---\n");
    for (key, value) in headers.iter().zip(values.iter()) {
        out.push_str(key.as_ref());
        out.push_str(": ");
        out.push_str(&escape_value(value.as_ref()));
        out.push('\n');
    }
    out.push_str(&format!("tags: [\"{}\"]\n", escape_value(tag)));
    out.push_str("---\n");
    out
}

fn is_blank_row(row: &[Data]) -> bool {
    row.iter().all(|cell| matches!(cell, Data::Empty))
}

fn cells_to_strings(row: &[Data]) -> Vec<String> {
    row.iter().map(|cell| cell.to_string()).collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetExtractor;

impl SpreadsheetExtractor {
    fn format_error(path: &Path, cause: impl std::fmt::Display) -> ExtractError {
        ExtractError::Format {
            format: FORMAT,
            path: path.to_path_buf(),
            cause: cause.to_string(),
        }
    }

    fn document(sheet: &str, index: usize, content: String) -> ExtractedDocument {
        ExtractedDocument {
            relative_path: PathBuf::from(row_file_name(sheet, index)),
            content,
        }
    }
}

impl Extractor for SpreadsheetExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractionResult, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::NotFound(path.to_path_buf()));
        }

        let mut workbook: Xlsx<_> =
            open_workbook(path).map_err(|e| Self::format_error(path, e))?;
        workbook
            .load_tables()
            .map_err(|e| Self::format_error(path, e))?;

        let mut documents = Vec::new();

        for sheet in workbook.sheet_names() {
            let tables: Vec<String> = workbook
                .table_names_in_sheet(&sheet)
                .into_iter()
                .cloned()
                .collect();
            let mut index = 1;

            if tables.is_empty() {
                let range = workbook
                    .worksheet_range(&sheet)
                    .map_err(|e| Self::format_error(path, e))?;
                let mut rows = range.rows().filter(|row| !is_blank_row(row));
                let Some(header_row) = rows.next() else {
                    debug!(sheet = %sheet, "Sheet has no used range, skipping");
                    continue;
                };
                let headers = cells_to_strings(header_row);
                for row in rows {
                    let content = row_front_matter(&headers, &cells_to_strings(row), NOT_ASSIGNED_TAG);
                    documents.push(Self::document(&sheet, index, content));
                    index += 1;
                }
                continue;
            }

            for table_name in tables {
                let table = workbook
                    .table_by_name(&table_name)
                    .map_err(|e| Self::format_error(path, e))?;
                let headers = table.columns().to_vec();
                for row in table.data().rows() {
                    let content = row_front_matter(&headers, &cells_to_strings(row), table.name());
                    documents.push(Self::document(&sheet, index, content));
                    index += 1;
                }
            }
        }

        debug!(path = %path.display(), documents = documents.len(), "Spreadsheet exploded");
        Ok(ExtractionResult::Multiple(documents))
    }
}
