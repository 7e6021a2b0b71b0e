//! Collection exports (JSON, CSV, XLSX) and blank import templates.

use crate::convert::flatten;
use crate::record::{Record, Row};
use crate::schema::Schema;
use anyhow::Context;
use serde_json::Value;
use std::collections::BTreeSet;
use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<ExportFormat> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            "xlsx" | "excel" => Some(ExportFormat::Xlsx),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
}

pub fn export_file_name(schema: &Schema, format: ExportFormat) -> String {
    format!(
        "{}_export_{}.{}",
        schema.name,
        chrono::Local::now().format("%Y-%m-%d"),
        format.extension()
    )
}

pub fn template_file_name(schema: &Schema) -> String {
    format!("{}_template.xlsx", schema.name)
}

/// Schema columns first, then any extra keys seen in the rows, sorted.
pub fn column_order(schema: &Schema, rows: &[Row]) -> Vec<String> {
    let mut columns = schema.columns();
    let known: BTreeSet<String> = columns.iter().cloned().collect();
    let extra: BTreeSet<String> = rows
        .iter()
        .flat_map(|r| r.keys())
        .filter(|k| !known.contains(*k))
        .cloned()
        .collect();
    columns.extend(extra);
    columns
}

fn cell(row: &Row, column: &str) -> String {
    match row.get(column) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn to_csv(columns: &[String], rows: &[Row]) -> String {
    let mut out = String::new();
    out.push_str(&columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(","));
    out.push('\n');
    for row in rows {
        let line = columns
            .iter()
            .map(|c| quote(&cell(row, c)))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Single-sheet workbook: the header row, then one row per record. Blank cells are
/// left empty.
pub fn write_xlsx(out_path: &Path, columns: &[String], rows: &[Row]) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let header: Vec<String> = columns.to_vec();
    let body = rows
        .iter()
        .map(|r| columns.iter().map(|c| cell(r, c)).collect::<Vec<_>>());
    for (r, values) in std::iter::once(header).chain(body).enumerate() {
        let row = u32::try_from(r).context("too many rows for a worksheet")?;
        for (c, value) in values.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let col = u16::try_from(c).context("too many columns for a worksheet")?;
            sheet
                .write_string(row, col, value)
                .with_context(|| format!("failed to write cell at row {} column {}", r + 1, c + 1))?;
        }
    }
    workbook.save(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    Ok(())
}

fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))
}

pub fn export_collection(
    schema: &Schema,
    records: &[Record],
    format: ExportFormat,
    out_dir: &Path,
) -> anyhow::Result<ExportSummary> {
    ensure_dir(out_dir)?;
    let path = out_dir.join(export_file_name(schema, format));
    let (rows, columns) = match format {
        ExportFormat::Json => {
            let body = serde_json::to_string_pretty(records).context("failed to serialize records")?;
            std::fs::write(&path, body)
                .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
            (records.len(), 0)
        }
        ExportFormat::Csv | ExportFormat::Xlsx => {
            let flat: Vec<Row> = records.iter().map(flatten).collect();
            let columns = column_order(schema, &flat);
            if format == ExportFormat::Csv {
                std::fs::write(&path, to_csv(&columns, &flat))
                    .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
            } else {
                write_xlsx(&path, &columns, &flat)?;
            }
            (flat.len(), columns.len())
        }
    };
    tracing::info!(
        collection = schema.name,
        path = %path.display(),
        rows,
        "exported collection"
    );
    Ok(ExportSummary {
        path,
        rows,
        columns,
    })
}

/// Header-only workbook with the canonical column names.
pub fn write_template(schema: &Schema, out_dir: &Path) -> anyhow::Result<ExportSummary> {
    ensure_dir(out_dir)?;
    let path = out_dir.join(template_file_name(schema));
    let columns = schema.columns();
    write_xlsx(&path, &columns, &[])?;
    Ok(ExportSummary {
        path,
        rows: 0,
        columns: columns.len(),
    })
}
