use csv_async::{AsyncWriter, AsyncWriterBuilder};
use std::path::Path;
use tokio::fs::File;

use crate::{CsvResult, Row};

/// Async CSV writer for an ingested batch.
pub struct CsvSink {
    writer: AsyncWriter<File>,
    rows_written: usize,
}

impl CsvSink {
    pub async fn create(path: &Path, delimiter: u8) -> CsvResult<Self> {
        let file = File::create(path).await?;
        let writer = AsyncWriterBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .create_writer(file);
        Ok(Self {
            writer,
            rows_written: 0,
        })
    }

    pub async fn write_header<S: AsRef<str>>(&mut self, columns: &[S]) -> CsvResult<()> {
        self.writer
            .write_record(columns.iter().map(|c| c.as_ref()))
            .await?;
        Ok(())
    }

    pub async fn write_rows(&mut self, rows: &[Row]) -> CsvResult<usize> {
        for row in rows {
            self.writer.write_record(row).await?;
        }
        self.rows_written += rows.len();
        Ok(rows.len())
    }

    /// Flush and close; returns the total number of data rows written.
    pub async fn finish(mut self) -> CsvResult<usize> {
        self.writer.flush().await?;
        tracing::debug!(rows = self.rows_written, "csv sink flushed");
        Ok(self.rows_written)
    }
}
