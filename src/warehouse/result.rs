//! Tabular statement results
//!
//! The warehouse returns every cell as text (or null). Typed access happens
//! here so that shape problems become `MalformedResult` errors in one place.

use crate::error::{MetricsError, Result};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// Build from JSON rows as the warehouse sends them.
    pub fn from_json_rows(columns: Vec<String>, data: Vec<Vec<Value>>) -> Result<Self> {
        let width = columns.len();
        let mut rows = Vec::with_capacity(data.len());

        for (idx, row) in data.into_iter().enumerate() {
            if row.len() != width {
                return Err(MetricsError::MalformedResult(format!(
                    "row {} has {} values but the result has {} columns",
                    idx,
                    row.len(),
                    width
                )));
            }
            rows.push(row.into_iter().map(cell_text).collect());
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                MetricsError::MalformedResult(format!(
                    "missing column '{}' (got: {})",
                    name,
                    self.columns.join(", ")
                ))
            })
    }

    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|cell| cell.as_deref())
    }

    pub fn required_text(&self, row: usize, col: usize) -> Result<&str> {
        self.text(row, col).ok_or_else(|| {
            MetricsError::MalformedResult(format!(
                "null value in column '{}' at row {}",
                self.column_name(col),
                row
            ))
        })
    }

    /// Non-negative whole number. A null (e.g. SUM over nothing) reads as zero.
    pub fn count(&self, row: usize, col: usize) -> Result<u64> {
        let raw = match self.text(row, col) {
            None => return Ok(0),
            Some(raw) => raw.trim(),
        };

        if let Ok(n) = raw.parse::<u64>() {
            return Ok(n);
        }
        // Some engines render integral sums as "150.0"
        match raw.parse::<f64>() {
            Ok(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
            _ => Err(MetricsError::MalformedResult(format!(
                "expected a non-negative count in column '{}' at row {}, got '{}'",
                self.column_name(col),
                row,
                raw
            ))),
        }
    }

    pub fn decimal(&self, row: usize, col: usize) -> Result<Option<f64>> {
        match self.text(row, col) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<f64>().map(Some).map_err(|_| {
                MetricsError::MalformedResult(format!(
                    "expected a decimal in column '{}' at row {}, got '{}'",
                    self.column_name(col),
                    row,
                    raw
                ))
            }),
        }
    }

    fn column_name(&self, col: usize) -> &str {
        self.columns.get(col).map(String::as_str).unwrap_or("?")
    }
}

fn cell_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
