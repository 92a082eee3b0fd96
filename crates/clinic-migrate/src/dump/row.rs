//! Column-named legacy rows.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::value::LegacyValue;

/// Ordered column-name to value mapping for one legacy row.
///
/// Exists only while a run transforms it into a typed record.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRow {
    table: String,
    columns: Arc<Vec<String>>,
    values: Vec<LegacyValue>,
}

impl LegacyRow {
    /// Build a row. `columns` and `values` must have the same length.
    pub fn new(table: &str, columns: Arc<Vec<String>>, values: Vec<LegacyValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self {
            table: table.to_string(),
            columns,
            values,
        }
    }

    /// Convenience constructor for tests and fixtures.
    pub fn from_pairs(table: &str, pairs: Vec<(&str, LegacyValue)>) -> Self {
        let (columns, values): (Vec<String>, Vec<LegacyValue>) = pairs
            .into_iter()
            .map(|(c, v)| (c.to_string(), v))
            .unzip();
        Self::new(table, Arc::new(columns), values)
    }

    /// Source table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value for a column, matched case-insensitively.
    pub fn get(&self, column: &str) -> Option<&LegacyValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    /// Trimmed, non-empty text for a column.
    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column)
            .and_then(LegacyValue::to_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(LegacyValue::as_i64)
    }

    pub fn float(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(LegacyValue::as_f64)
    }

    /// Iterate `(column, value)` pairs in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LegacyValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Per-table tokenizer counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    /// Tuples found inside the table's INSERT blocks.
    pub rows_seen: usize,

    /// Tuples whose value count matched the column count.
    pub rows_parsed: usize,

    /// Tuples discarded for a column count mismatch.
    pub rows_malformed: usize,
}

/// Result of scanning one table.
#[derive(Debug, Clone)]
pub struct TableScan {
    pub table: String,
    pub rows: Vec<LegacyRow>,
    pub stats: ParseStats,
}
