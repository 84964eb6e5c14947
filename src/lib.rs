//! Bounded streaming ingestion of uploaded CSV files.
//!
//! - Upload streams are read chunk by chunk; memory is bounded by the chunk
//!   size plus one unterminated record, never by the upload.
//! - The dialect is sniffed once from the first chunk and kept for the call.
//! - A row limit is enforced while streaming; a breach stops reading and
//!   returns the rows so far as [`IngestionResult::LimitExceeded`].
//!
//! Data shape:
//! - [`Row`] is `Vec<String>`, [`RowBatch`] is `Vec<Row>` in upload order.
//! - Headers are ordinary rows here; naming columns is up to the caller
//!   ([`assign_column_names`]).
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod chunk;
mod codec;
mod config;
mod dialect;
mod guard;
mod io;
mod parser;
mod pipeline;
mod sink;
mod transform;

pub use crate::chunk::ChunkReader;
pub use crate::codec::TextDecoder;
pub use crate::config::{IngestConfig, DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_ROWS_LIMIT};
pub use crate::dialect::Dialect;
pub use crate::guard::RowLimitGuard;
pub use crate::io::{open_upload, upload_from_path, UploadMeta};
pub use crate::parser::{IncrementalCsvParser, Rows};
pub use crate::pipeline::{
    ingest, ingest_cancellable, ingest_with, IngestionPipeline, IngestionResult, PipelineState,
};
pub use crate::sink::CsvSink;
pub use crate::transform::{
    assign_column_names, column_count, drop_incomplete_rows, LabeledBatch,
};

use thiserror::Error;

/// One parsed CSV record, fields in order.
pub type Row = Vec<String>;

/// Rows of one ingestion call, in arrival order.
pub type RowBatch = Vec<Row>;

/// Error type returned by this crate.
///
/// Hitting the row limit is not an error; see [`IngestionResult`].
#[derive(Debug, Error)]
pub enum CsvIngestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid {encoding} byte sequence near byte {offset}")]
    Encoding { encoding: &'static str, offset: u64 },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    CsvWrite(#[from] csv_async::Error),
    #[error("expected {expected} column names, batch has {found} columns")]
    SchemaMismatch { expected: usize, found: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("ingestion cancelled")]
    Cancelled,
}

pub type CsvResult<T> = std::result::Result<T, CsvIngestError>;
