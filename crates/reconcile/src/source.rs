//! Row sources.
//!
//! A source yields raw rows (header → cell value) in stable original order.
//! Sources are restartable: every call to [`RowSource::rows`] starts over
//! from the first row, which is what makes an external re-run of a batch
//! possible.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use projtrack_core::normalize::RawValue;

use crate::error::ReconcileError;

/// One source record: original header → raw cell value.
pub type RawRow = BTreeMap<String, RawValue>;

/// Iterator over a source's rows. A malformed record surfaces as an `Err`
/// item for that row only.
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<RawRow, ReconcileError>> + Send + 'a>;

pub trait RowSource: Send + Sync {
    /// Start a fresh pass over the rows.
    fn rows(&self) -> Result<RowIter<'_>, ReconcileError>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Rows held in memory, mostly for tests and programmatic callers.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    rows: Vec<RawRow>,
}

impl VecSource {
    pub fn new(rows: Vec<RawRow>) -> Self {
        Self { rows }
    }

    /// Build rows from `(header, text)` pairs.
    pub fn from_pairs<'a>(rows: impl IntoIterator<Item = &'a [(&'a str, &'a str)]>) -> Self {
        Self::new(
            rows.into_iter()
                .map(|pairs| {
                    pairs
                        .iter()
                        .map(|(k, v)| (k.to_string(), RawValue::from(*v)))
                        .collect()
                })
                .collect(),
        )
    }
}

impl RowSource for VecSource {
    fn rows(&self) -> Result<RowIter<'_>, ReconcileError> {
        Ok(Box::new(self.rows.iter().cloned().map(Ok)))
    }
}

// ---------------------------------------------------------------------------
// JSON lines
// ---------------------------------------------------------------------------

/// One JSON object per line, as exported from the tabular reader.
///
/// Blank lines are ignored. A line that is not a JSON object becomes a
/// per-row error, so it is reported rather than aborting the batch.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowSource for JsonLinesSource {
    fn rows(&self) -> Result<RowIter<'_>, ReconcileError> {
        let file = File::open(&self.path)
            .map_err(|e| ReconcileError::Source(format!("{}: {e}", self.path.display())))?;
        let lines = BufReader::new(file).lines().enumerate();

        Ok(Box::new(lines.filter_map(|(n, line)| {
            let line_no = n + 1;
            match line {
                Ok(text) if text.trim().is_empty() => None,
                Ok(text) => Some(parse_line(line_no, &text)),
                Err(e) => Some(Err(ReconcileError::Source(format!("line {line_no}: {e}")))),
            }
        })))
    }
}

fn parse_line(line_no: usize, text: &str) -> Result<RawRow, ReconcileError> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, RawValue::from(v)))
            .collect()),
        Ok(_) => Err(ReconcileError::Source(format!(
            "line {line_no}: expected a JSON object"
        ))),
        Err(e) => Err(ReconcileError::Source(format!("line {line_no}: {e}"))),
    }
}
