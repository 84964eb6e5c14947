//! Post-ingestion cleanup over an already materialized [`RowBatch`].

use crate::{CsvIngestError, CsvResult, Row, RowBatch};

/// A batch whose columns have been given names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledBatch {
    pub columns: Vec<String>,
    pub rows: RowBatch,
}

impl LabeledBatch {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `column` in row `row`; `None` for unknown columns or short rows.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx).map(String::as_str)
    }
}

/// Column count of a batch: the width of its widest row.
pub fn column_count(batch: &[Row]) -> usize {
    batch.iter().map(Vec::len).max().unwrap_or(0)
}

/// Remove rows with an empty field or fewer fields than the widest row.
pub fn drop_incomplete_rows(batch: RowBatch) -> RowBatch {
    let width = column_count(&batch);
    let before = batch.len();
    let kept: RowBatch = batch
        .into_iter()
        .filter(|row| row.len() == width && row.iter().all(|f| !f.is_empty()))
        .collect();
    tracing::debug!(dropped = before - kept.len(), kept = kept.len(), "dropped incomplete rows");
    kept
}

/// Label the batch's columns; the name count must match the column count.
pub fn assign_column_names<S>(names: &[S], batch: RowBatch) -> CsvResult<LabeledBatch>
where
    S: AsRef<str>,
{
    let found = column_count(&batch);
    if names.len() != found {
        return Err(CsvIngestError::SchemaMismatch {
            expected: names.len(),
            found,
        });
    }
    Ok(LabeledBatch {
        columns: names.iter().map(|n| n.as_ref().to_string()).collect(),
        rows: batch,
    })
}
