//! CSV and spreadsheet readers producing flat rows keyed by canonical column names.
//!
//! The CSV reader is deliberately naive: lines split on commas and surrounding double
//! quotes are stripped. Embedded commas, escaped quotes and multi-line cells are not
//! supported.

use crate::catalog::COMMON_ALIASES;
use crate::error::{StoreError, StoreResult};
use crate::record::Row;
use crate::schema::Schema;
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<SourceFormat> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(SourceFormat::Json),
            "csv" => Some(SourceFormat::Csv),
            "xlsx" | "xls" => Some(SourceFormat::Spreadsheet),
            _ => None,
        }
    }
}

/// Lower-case, trim, collapse whitespace/dots/hyphens into single underscores, then
/// resolve through the collection's alias table and the shared one.
pub fn normalize_header(schema: &Schema, raw: &str) -> String {
    let mut out = String::new();
    let mut pending_sep = false;
    for ch in raw.trim().to_lowercase().chars() {
        if ch.is_whitespace() || ch == '.' || ch == '-' || ch == '_' {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        out.push(ch);
    }
    if let Some((_, target)) = schema.aliases.iter().find(|(from, _)| *from == out) {
        return target.to_string();
    }
    if let Some((_, target)) = COMMON_ALIASES.iter().find(|(from, _)| *from == out) {
        return target.to_string();
    }
    out
}

fn strip_quotes(cell: &str) -> String {
    cell.trim().trim_matches('"').trim().to_string()
}

fn build_rows(schema: &Schema, header: &[String], body: Vec<Vec<String>>) -> Vec<Row> {
    let columns: Vec<String> = header.iter().map(|h| normalize_header(schema, h)).collect();
    let mut rows = Vec::new();
    for cells in body {
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let mut row = Row::new();
        for (i, column) in columns.iter().enumerate() {
            if column.is_empty() {
                continue;
            }
            let value = cells.get(i).cloned().unwrap_or_default();
            // First non-empty cell wins when two headers alias to the same column.
            let keep_existing = row
                .get(column)
                .and_then(|v| v.as_str())
                .map(|s| !s.is_empty())
                .unwrap_or(false);
            if !keep_existing {
                row.insert(column.clone(), Value::String(value));
            }
        }
        rows.push(row);
    }
    rows
}

pub fn parse_csv(schema: &Schema, text: &str) -> StoreResult<Vec<Row>> {
    let lines: Vec<&str> = text
        .trim_start_matches('\u{feff}')
        .lines()
        .filter(|l| !l.trim().is_empty())
        .collect();
    if lines.len() < 2 {
        return Err(StoreError::parse("CSV needs a header row and at least one data row"));
    }
    let header: Vec<String> = lines[0].split(',').map(strip_quotes).collect();
    let body = lines[1..]
        .iter()
        .map(|line| line.split(',').map(strip_quotes).collect())
        .collect();
    Ok(build_rows(schema, &header, body))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

pub fn parse_spreadsheet(schema: &Schema, path: &Path) -> StoreResult<Vec<Row>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| StoreError::parse(format!("cannot open workbook: {e}")))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| StoreError::parse("workbook has no sheets"))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| StoreError::parse(format!("cannot read sheet {sheet}: {e}")))?;
    let mut grid: Vec<Vec<String>> = range
        .rows()
        .map(|r| r.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .collect();
    if grid.len() < 2 {
        return Err(StoreError::parse(format!(
            "sheet {sheet} needs a header row and at least one data row"
        )));
    }
    let header = grid.remove(0);
    Ok(build_rows(schema, &header, grid))
}

/// Dispatches on the file extension. JSON is not tabular and is rejected here.
pub fn parse_file(schema: &Schema, path: &Path) -> StoreResult<Vec<Row>> {
    match SourceFormat::from_path(path) {
        Some(SourceFormat::Csv) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| StoreError::parse(format!("cannot read {}: {e}", path.display())))?;
            parse_csv(schema, &text)
        }
        Some(SourceFormat::Spreadsheet) => parse_spreadsheet(schema, path),
        _ => Err(StoreError::parse(format!(
            "unsupported tabular file: {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    #[test]
    fn headers_normalize_and_alias() {
        let s = catalog::students();
        assert_eq!(normalize_header(&s, " Course "), "academic_info_program");
        assert_eq!(normalize_header(&s, "E-mail"), "contact_info_email");
        assert_eq!(normalize_header(&s, "Email"), "contact_info_email");
        assert_eq!(normalize_header(&s, "Registration No."), "id");
        assert_eq!(normalize_header(&s, "Academic  Info.Semester"), "academic_info_semester");
        assert_eq!(normalize_header(&s, "Hobby"), "hobby");
    }

    #[test]
    fn csv_rows_are_keyed_by_canonical_columns() {
        let s = catalog::students();
        let text = "\"Name\",\"Course\",\"Email\"\n\"Asha Rao\",\"BSc Physics\",\"asha@uni.edu\"\n,,\n";
        let rows = parse_csv(&s, text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Asha Rao");
        assert_eq!(rows[0]["academic_info_program"], "BSc Physics");
        assert_eq!(rows[0]["contact_info_email"], "asha@uni.edu");
    }

    #[test]
    fn header_only_csv_is_a_parse_error() {
        let s = catalog::entities();
        let err = parse_csv(&s, "name,code,type\n").unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
        assert!(matches!(parse_csv(&s, ""), Err(StoreError::Parse(_))));
    }

    #[test]
    fn embedded_commas_are_not_supported() {
        let s = catalog::entities();
        let rows = parse_csv(&s, "name,code\n\"Smith, John\",X1\n").unwrap();
        assert_eq!(rows[0]["name"], "Smith");
        assert_eq!(rows[0]["code"], "John");
    }

    #[test]
    fn short_rows_fill_missing_cells_with_empty_text() {
        let s = catalog::entities();
        let rows = parse_csv(&s, "name,code,type\nNorth\n").unwrap();
        assert_eq!(rows[0]["code"], "");
        assert_eq!(rows[0]["type"], "");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let s = catalog::entities();
        let err = parse_file(&s, Path::new("roster.txt")).unwrap_err();
        assert_eq!(err.code(), "parse_failed");
    }

    #[test]
    fn unreadable_workbook_is_a_parse_error() {
        let dir = std::env::temp_dir().join(format!("campusd-tabular-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let p = dir.join("broken.xlsx");
        std::fs::write(&p, b"definitely not a zip").unwrap();
        let err = parse_file(&catalog::entities(), &p).unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
        let _ = std::fs::remove_dir_all(dir);
    }
}
