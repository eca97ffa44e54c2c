//! Rendering of function results and metadata listings
//!
//! Pure string builders; the caller decides where the text goes.

use crate::db::types::{CellValue, QueryResults};
use clap::ValueEnum;
use unicode_truncate::UnicodeTruncateStr;
use unicode_width::UnicodeWidthStr;

/// How `exec` prints its result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Aligned columns for the terminal
    #[default]
    Table,
    /// RFC 4180 CSV with a header row
    Csv,
    /// Array of objects with typed values
    Json,
}

impl OutputFormat {
    pub fn render(self, results: &QueryResults, max_cell_width: usize) -> String {
        match self {
            OutputFormat::Table => to_table(results, max_cell_width),
            OutputFormat::Csv => to_csv(results),
            OutputFormat::Json => to_json(results),
        }
    }
}

/// Render rows as a left-aligned text table, clipping wide cells
pub fn to_table(results: &QueryResults, max_cell_width: usize) -> String {
    let header: Vec<String> = results.columns.iter().map(|c| c.name.clone()).collect();
    let body: Vec<Vec<String>> = results
        .rows
        .iter()
        .map(|row| row.values.iter().map(ToString::to_string).collect())
        .collect();
    let mut table = text_table(&header, &body, max_cell_width);
    table.push_str(&format!(
        "({} row{}, {:.2?})\n",
        results.row_count,
        if results.row_count == 1 { "" } else { "s" },
        results.execution_time
    ));
    table
}

/// Align arbitrary text rows under a header, clipping cells to `max_width`
/// display columns
pub fn text_table(header: &[String], rows: &[Vec<String>], max_width: usize) -> String {
    let clip = |cell: &str| -> String {
        let cell = cell.replace(['\n', '\r'], " ");
        if cell.width() <= max_width {
            cell
        } else {
            let (kept, _) = cell.unicode_truncate(max_width.saturating_sub(1));
            format!("{}…", kept)
        }
    };
    let header: Vec<String> = header.iter().map(|h| clip(h)).collect();
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|c| clip(c)).collect())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.width()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.width());
            }
        }
    }

    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{}{}", cell, " ".repeat(w - cell.width())))
            .collect();
        format!("{}\n", padded.join(" | ").trim_end())
    };

    let mut out = line(&header);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&format!("{}\n", rule.join("-+-")));
    for row in &rows {
        out.push_str(&line(row));
    }
    out
}

/// Serialize results as RFC 4180 CSV; NULL becomes an empty field
pub fn to_csv(results: &QueryResults) -> String {
    let mut out = String::new();
    let header: Vec<String> = results.columns.iter().map(|c| csv_field(&c.name)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in &results.rows {
        let fields: Vec<String> = row
            .values
            .iter()
            .map(|cell| csv_field(&export_text(cell)))
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Serialize results as a pretty JSON array of objects, keeping value types
pub fn to_json(results: &QueryResults) -> String {
    let rows: Vec<serde_json::Value> = results
        .rows
        .iter()
        .map(|row| {
            let obj: serde_json::Map<String, serde_json::Value> = results
                .columns
                .iter()
                .zip(&row.values)
                .map(|(col, cell)| (col.name.clone(), json_value(cell)))
                .collect();
            serde_json::Value::Object(obj)
        })
        .collect();
    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

fn export_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        CellValue::Binary(b) => hex(b),
        CellValue::Array(items) => {
            let inner: Vec<String> = items.iter().map(export_text).collect();
            format!("{{{}}}", inner.join(","))
        }
        other => other.to_string(),
    }
}

fn json_value(cell: &CellValue) -> serde_json::Value {
    use serde_json::Value;
    match cell {
        CellValue::Null => Value::Null,
        CellValue::Integer(i) => Value::from(*i),
        // NaN and infinities are not JSON numbers
        CellValue::Float(f) if !f.is_finite() => Value::String(f.to_string()),
        CellValue::Float(f) => Value::from(*f),
        CellValue::Boolean(b) => Value::Bool(*b),
        CellValue::Json(v) => v.clone(),
        CellValue::Binary(b) => Value::String(hex(b)),
        CellValue::Array(items) => Value::Array(items.iter().map(json_value).collect()),
        CellValue::Text(s) | CellValue::DateTime(s) | CellValue::Uuid(s) => {
            Value::String(s.clone())
        }
    }
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn hex(bytes: &[u8]) -> String {
    let digits: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("\\x{}", digits)
}
