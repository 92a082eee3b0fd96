//! Legacy dump reader and row tokenizer.
//!
//! The export is scanned line by line and is never treated as one parseable
//! SQL document:
//!
//! - A line starting with `INSERT INTO <table>` opens capture for that table.
//! - A comment line (`--`, `/*`, `#`) or a DDL line closes it, so DDL may be
//!   interleaved between INSERT blocks.
//! - Inside capture, a line that starts with `(` holds one or more row tuples.
//!
//! Rows whose value count does not match the expected column count are
//! discarded and counted. A missing file is the only fatal condition.

mod records;
mod row;
pub mod value;

pub use records::{FromLegacyRow, LegacyAppointment, LegacyCharge, LegacyDoctor, LegacyPatient};
pub use row::{LegacyRow, ParseStats, TableScan};
pub use value::{parse_row_values, LegacyValue};

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};

/// Keywords that end an INSERT block when they start a line.
const DDL_KEYWORDS: &[&str] = &["CREATE", "DROP", "ALTER", "TRUNCATE", "LOCK", "UNLOCK"];

/// Handle on a legacy dump file.
#[derive(Debug, Clone)]
pub struct DumpReader {
    path: PathBuf,
}

impl DumpReader {
    /// Open a dump file. Fails if the file does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(MigrateError::DumpNotFound(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazily yield raw row bodies for one table.
    pub fn rows(&self, table: &str) -> Result<RowScanner<BufReader<File>>> {
        let file = File::open(&self.path)?;
        Ok(RowScanner::new(
            BufReader::with_capacity(256 * 1024, file),
            table,
        ))
    }

    /// Scan one table into column-checked rows.
    pub fn scan_table(&self, table: &str, default_columns: &[&str]) -> Result<TableScan> {
        scan_rows(self.rows(table)?, table, default_columns)
    }

    /// Scan one table straight into typed records.
    ///
    /// Rows without a usable legacy id count as malformed.
    pub fn read_table<T: FromLegacyRow>(&self, table: &str) -> Result<(Vec<T>, ParseStats)> {
        let scan = self.scan_table(table, T::COLUMNS)?;
        Ok(typed_records(&scan))
    }
}

/// Convert a scan into typed records, moving id-less rows to the malformed count.
pub fn typed_records<T: FromLegacyRow>(scan: &TableScan) -> (Vec<T>, ParseStats) {
    let records: Vec<T> = scan.rows.iter().filter_map(T::from_row).collect();
    let mut stats = scan.stats;
    let without_id = scan.rows.len() - records.len();
    if without_id > 0 {
        warn!(table = %scan.table, without_id, "Discarded rows without a legacy id");
        stats.rows_malformed += without_id;
        stats.rows_parsed -= without_id;
    }
    (records, stats)
}

/// One raw tuple body found inside an INSERT block.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based physical line number.
    pub line: usize,

    /// Text between the tuple's outer parentheses.
    pub body: String,

    /// Column list from the INSERT marker, when it carried one.
    pub columns: Option<Arc<Vec<String>>>,
}

/// Lazy iterator over the raw rows of one table.
pub struct RowScanner<R: BufRead> {
    lines: Lines<R>,
    table: String,
    capturing: bool,
    columns: Option<Arc<Vec<String>>>,
    pending: VecDeque<RawRow>,
    line_no: usize,
}

impl<R: BufRead> RowScanner<R> {
    pub fn new(reader: R, table: &str) -> Self {
        Self {
            lines: reader.lines(),
            table: table.to_string(),
            capturing: false,
            columns: None,
            pending: VecDeque::new(),
            line_no: 0,
        }
    }

    fn handle_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        // Comments end a block and never open one.
        if is_comment(trimmed) {
            self.capturing = false;
            return;
        }

        // Row lines never act as markers, even if a string value says INSERT INTO.
        let marker = if trimmed.starts_with('(') {
            None
        } else {
            insert_target(trimmed)
        };
        if let Some((table, rest)) = marker {
            self.capturing = table.eq_ignore_ascii_case(&self.table);
            if !self.capturing {
                return;
            }
            self.columns = parse_column_list(rest).map(Arc::new);
            if let Some(values) = values_clause(rest) {
                if values.starts_with('(') {
                    self.push_tuples(values);
                }
            }
            return;
        }

        if closes_capture(trimmed) {
            self.capturing = false;
            return;
        }

        if self.capturing && trimmed.starts_with('(') {
            self.push_tuples(trimmed);
        }
    }

    fn push_tuples(&mut self, text: &str) {
        for body in split_tuples(text) {
            self.pending.push_back(RawRow {
                line: self.line_no,
                body,
                columns: self.columns.clone(),
            });
        }
    }
}

impl<R: BufRead> Iterator for RowScanner<R> {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Some(Ok(row));
            }
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            self.handle_line(&line);
        }
    }
}

/// Parse raw rows into column-checked [`LegacyRow`]s.
pub fn scan_rows<I>(rows: I, table: &str, default_columns: &[&str]) -> Result<TableScan>
where
    I: IntoIterator<Item = Result<RawRow>>,
{
    let defaults: Arc<Vec<String>> =
        Arc::new(default_columns.iter().map(|c| c.to_string()).collect());
    let mut stats = ParseStats::default();
    let mut parsed = Vec::new();

    for raw in rows {
        let raw = raw?;
        stats.rows_seen += 1;

        let columns = raw.columns.unwrap_or_else(|| defaults.clone());
        let values = parse_row_values(&raw.body);
        if values.len() != columns.len() {
            stats.rows_malformed += 1;
            debug!(
                table,
                line = raw.line,
                expected = columns.len(),
                got = values.len(),
                "Discarding malformed row"
            );
            continue;
        }
        parsed.push(LegacyRow::new(table, columns, values));
    }

    stats.rows_parsed = parsed.len();
    if stats.rows_malformed > 0 {
        warn!(
            table,
            malformed = stats.rows_malformed,
            parsed = stats.rows_parsed,
            "Discarded rows with a column count mismatch"
        );
    }
    info!(table, rows = stats.rows_parsed, "Parsed legacy table");

    Ok(TableScan {
        table: table.to_string(),
        rows: parsed,
        stats,
    })
}

/// If the line starts with an `INSERT INTO` marker, return the target table
/// name and the text after it.
fn insert_target(line: &str) -> Option<(String, &str)> {
    const MARKER: &str = "INSERT INTO";
    let head = line.get(..MARKER.len())?;
    if !head.eq_ignore_ascii_case(MARKER) {
        return None;
    }
    let mut rest = line[MARKER.len()..].trim_start();

    let (mut name, after) = read_ident(rest)?;
    rest = after;
    while let Some(stripped) = rest.strip_prefix('.') {
        let (segment, after) = read_ident(stripped)?;
        name = segment;
        rest = after;
    }
    Some((name, rest))
}

/// Read one possibly quoted identifier.
fn read_ident(s: &str) -> Option<(String, &str)> {
    let close = match s.chars().next()? {
        '`' => '`',
        '"' => '"',
        '[' => ']',
        _ => {
            let end = s
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                .unwrap_or(s.len());
            if end == 0 {
                return None;
            }
            return Some((s[..end].to_string(), &s[end..]));
        }
    };
    let inner = &s[1..];
    let end = inner.find(close)?;
    Some((inner[..end].to_string(), &inner[end + 1..]))
}

/// Byte offset of the `VALUES` keyword, if any.
fn values_keyword(rest: &str) -> Option<usize> {
    rest.to_ascii_uppercase().find("VALUES")
}

/// Text after `VALUES`, trimmed.
fn values_clause(rest: &str) -> Option<&str> {
    let pos = values_keyword(rest)?;
    Some(rest[pos + "VALUES".len()..].trim())
}

/// Explicit `(col, ...)` list between the table name and `VALUES`.
fn parse_column_list(rest: &str) -> Option<Vec<String>> {
    let trimmed = rest.trim_start();
    let inner = trimmed.strip_prefix('(')?;
    let close = inner.find(')')?;
    let values_at = values_keyword(inner).unwrap_or(usize::MAX);
    if close > values_at {
        return None;
    }

    let columns: Vec<String> = inner[..close]
        .split(',')
        .map(|c| {
            c.trim()
                .trim_matches(|ch| matches!(ch, '`' | '"' | '[' | ']'))
                .to_string()
        })
        .filter(|c| !c.is_empty())
        .collect();
    (!columns.is_empty()).then_some(columns)
}

fn is_comment(line: &str) -> bool {
    line.starts_with("--") || line.starts_with("/*") || line.starts_with('#')
}

/// Does this line end the current INSERT block?
fn closes_capture(line: &str) -> bool {
    if is_comment(line) {
        return true;
    }
    let first_word = line
        .split(|c: char| c.is_whitespace() || c == ';')
        .next()
        .unwrap_or("");
    DDL_KEYWORDS
        .iter()
        .any(|kw| first_word.eq_ignore_ascii_case(kw))
}

/// Split a line into the bodies of its top-level parenthesized tuples.
///
/// Quote-aware so parentheses and commas inside strings are kept. An
/// unterminated last tuple is returned as-is; its value count will not
/// match and the row is discarded downstream.
pub fn split_tuples(text: &str) -> Vec<String> {
    let mut tuples = Vec::new();
    let mut buf = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut quote = '\'';

    for ch in text.chars() {
        if in_string {
            if ch == quote {
                in_string = false;
            }
            buf.push(ch);
            continue;
        }

        match ch {
            '\'' | '"' if depth > 0 => {
                in_string = true;
                quote = ch;
                buf.push(ch);
            }
            '(' => {
                if depth > 0 {
                    buf.push(ch);
                }
                depth += 1;
            }
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    tuples.push(std::mem::take(&mut buf));
                } else {
                    buf.push(ch);
                }
            }
            _ if depth > 0 => buf.push(ch),
            _ => {}
        }
    }

    if depth > 0 && !buf.trim().is_empty() {
        tuples.push(buf);
    }
    tuples
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const DUMP: &str = "\
-- MySQL dump
DROP TABLE IF EXISTS `patients`;
CREATE TABLE `patients` (
  `id` int NOT NULL,
  `name` varchar(100)
);
LOCK TABLES `patients` WRITE;
INSERT INTO `patients` VALUES
(1,'Asha'),
(2,'Ravi (Jr.)'),
(3),
(4,'Meera');
UNLOCK TABLES;
INSERT INTO `doctors` VALUES
(9,'Dr. Rao');
/*!40000 ALTER TABLE `patients` ENABLE KEYS */;
INSERT INTO `patients` VALUES (5,'Kiran'),(6,'O''Neil');
";

    fn bodies(table: &str) -> Vec<String> {
        RowScanner::new(Cursor::new(DUMP), table)
            .map(|r| r.unwrap().body)
            .collect()
    }

    #[test]
    fn test_scanner_collects_rows_for_table() {
        let rows = bodies("patients");
        assert_eq!(
            rows,
            vec![
                "1,'Asha'",
                "2,'Ravi (Jr.)'",
                "3",
                "4,'Meera'",
                "5,'Kiran'",
                "6,'O''Neil'",
            ]
        );
    }

    #[test]
    fn test_scanner_ignores_other_tables() {
        assert_eq!(bodies("doctors"), vec!["9,'Dr. Rao'"]);
        assert!(bodies("charges").is_empty());
    }

    #[test]
    fn test_scan_rows_discards_column_mismatch() {
        let scan = scan_rows(
            RowScanner::new(Cursor::new(DUMP), "patients"),
            "patients",
            &["id", "name"],
        )
        .unwrap();
        assert_eq!(scan.stats.rows_seen, 6);
        assert_eq!(scan.stats.rows_malformed, 1);
        assert_eq!(scan.stats.rows_parsed, 5);
        assert_eq!(scan.rows[4].text("name").as_deref(), Some("O'Neil"));
    }

    #[test]
    fn test_ddl_line_closes_capture() {
        let dump = "INSERT INTO patients VALUES\n(1,'a'),\nCREATE TABLE x (\n(2,'b'),\n";
        let rows: Vec<_> = RowScanner::new(Cursor::new(dump), "patients")
            .map(|r| r.unwrap().body)
            .collect();
        assert_eq!(rows, vec!["1,'a'"]);
    }

    #[test]
    fn test_marker_column_list_is_used() {
        let dump = "INSERT INTO `charges` (`name`, `id`) VALUES ('X-Ray', 4);\n";
        let scan = scan_rows(
            RowScanner::new(Cursor::new(dump), "charges"),
            "charges",
            &["id", "name", "category"],
        )
        .unwrap();
        assert_eq!(scan.stats.rows_parsed, 1);
        assert_eq!(scan.rows[0].int("id"), Some(4));
        assert_eq!(scan.rows[0].text("name").as_deref(), Some("X-Ray"));
    }

    #[test]
    fn test_schema_qualified_marker() {
        let (table, _) = insert_target("INSERT INTO `legacy`.`patients` VALUES").unwrap();
        assert_eq!(table, "patients");
        let (table, _) = insert_target("insert into [dbo].[charges] values").unwrap();
        assert_eq!(table, "charges");
    }

    #[test]
    fn test_commented_out_insert_is_not_a_marker() {
        let dump = "\
-- INSERT INTO `patients` (`id`) VALUES
(1),
INSERT INTO `patients` (`id`,`name`) VALUES
(2,'Asha'),
/* INSERT INTO `patients` (`id`) VALUES */
(3),
# insert into patients values (4);
";
        let rows: Vec<_> = RowScanner::new(Cursor::new(dump), "patients")
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].body, "2,'Asha'");
        assert_eq!(
            rows[0].columns.as_deref().map(Vec::as_slice),
            Some(&["id".to_string(), "name".to_string()][..])
        );

        assert!(insert_target("-- INSERT INTO `patients` VALUES").is_none());
        assert!(insert_target("SELECT 1; INSERT INTO patients VALUES").is_none());
    }

    #[test]
    fn test_truncated_tuple_is_returned() {
        assert_eq!(split_tuples("(1,'a'),(2,'b"), vec!["1,'a'", "2,'b"]);
    }

    #[test]
    fn test_closes_capture_keywords() {
        assert!(closes_capture("-- comment"));
        assert!(closes_capture("/*!40101 SET NAMES utf8 */;"));
        assert!(closes_capture("UNLOCK TABLES;"));
        assert!(closes_capture("drop table foo;"));
        assert!(!closes_capture("(1,'CREATE')"));
    }

    #[test]
    fn test_missing_dump_is_fatal() {
        let err = DumpReader::open("/definitely/not/here.sql").unwrap_err();
        assert!(matches!(err, MigrateError::DumpNotFound(_)));
    }

    #[test]
    fn test_reader_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DUMP.as_bytes()).unwrap();

        let reader = DumpReader::open(file.path()).unwrap();
        let scan = reader.scan_table("patients", &["id", "name"]).unwrap();
        assert_eq!(scan.stats.rows_parsed, 5);
    }
}
