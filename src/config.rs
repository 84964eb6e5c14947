use encoding_rs::Encoding;

use crate::dialect::Dialect;
use crate::{CsvIngestError, CsvResult};

pub const DEFAULT_ROWS_LIMIT: usize = 100;
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 1024;

/// Limits and decoding options for one ingestion call.
///
/// Passed explicitly into the pipeline; nothing here is read from process
/// state. Binaries fill it from CLI flags / environment variables.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum number of rows (header included) before the call stops with
    /// [`crate::IngestionResult::LimitExceeded`].
    pub rows_limit: usize,
    /// Upper bound on the bytes pulled from the upload per read.
    pub chunk_size_bytes: usize,
    /// Optional ceiling checked after each chunk; reaching it ends the call
    /// with [`crate::IngestionResult::Complete`], truncated to the cap.
    pub row_cap: Option<usize>,
    /// Character encoding of the upload (defaults to UTF-8).
    pub encoding: &'static Encoding,
    /// Known dialect; `None` sniffs it from the first chunk.
    pub dialect: Option<Dialect>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            rows_limit: DEFAULT_ROWS_LIMIT,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            row_cap: None,
            encoding: encoding_rs::UTF_8,
            dialect: None,
        }
    }
}

impl IngestConfig {
    pub fn new(rows_limit: usize, chunk_size_bytes: usize) -> Self {
        Self {
            rows_limit,
            chunk_size_bytes,
            ..Default::default()
        }
    }

    pub fn with_row_cap(mut self, cap: usize) -> Self {
        self.row_cap = Some(cap);
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn validate(&self) -> CsvResult<()> {
        if self.chunk_size_bytes == 0 {
            return Err(CsvIngestError::InvalidConfig(
                "chunk_size_bytes must be greater than zero".into(),
            ));
        }
        if let Some(d) = self.dialect {
            if d.delimiter == d.quote {
                return Err(CsvIngestError::InvalidConfig(format!(
                    "delimiter and quote must differ (both {:?})",
                    char::from(d.delimiter)
                )));
            }
        }
        Ok(())
    }
}
