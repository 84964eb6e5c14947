//! The ingestion state machine: `Idle -> Streaming -> {Complete | LimitExceeded | Failed}`.
//!
//! One call owns its chunk reader, parser and row batch. Rows are appended in
//! stream order and the row guard runs after every append; the optional row
//! cap runs after each chunk. On any error the accumulated rows are dropped.

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::chunk::ChunkReader;
use crate::config::IngestConfig;
use crate::guard::RowLimitGuard;
use crate::parser::{IncrementalCsvParser, Rows};
use crate::{CsvIngestError, CsvResult, RowBatch};

/// Terminal outcome of a successful call.
///
/// `LimitExceeded` is not an error: it carries every row appended up to and
/// including the one that breached the limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionResult {
    Complete(RowBatch),
    LimitExceeded(RowBatch),
}

impl IngestionResult {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn rows(&self) -> &RowBatch {
        match self {
            Self::Complete(rows) | Self::LimitExceeded(rows) => rows,
        }
    }

    pub fn into_rows(self) -> RowBatch {
        match self {
            Self::Complete(rows) | Self::LimitExceeded(rows) => rows,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Streaming,
    Complete,
    LimitExceeded,
    Failed,
}

enum Absorbed {
    Continue,
    Breached,
}

pub struct IngestionPipeline<R> {
    chunks: ChunkReader<R>,
    parser: IncrementalCsvParser,
    guard: RowLimitGuard,
    row_cap: Option<usize>,
    rows: RowBatch,
    state: PipelineState,
}

impl<R> IngestionPipeline<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, config: &IngestConfig) -> CsvResult<Self> {
        config.validate()?;
        let parser = match config.dialect {
            Some(d) => IncrementalCsvParser::with_dialect(config.encoding, d),
            None => IncrementalCsvParser::new(config.encoding),
        };
        Ok(Self {
            chunks: ChunkReader::new(reader, config.chunk_size_bytes),
            parser,
            guard: RowLimitGuard::new(config.rows_limit),
            row_cap: config.row_cap,
            rows: Vec::new(),
            state: PipelineState::Idle,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Dialect in use, once the first non-empty chunk has been seen.
    pub fn dialect(&self) -> Option<crate::Dialect> {
        self.parser.dialect()
    }

    /// Drive the upload to a terminal state. Dropping the returned future
    /// cancels the call and discards any carried-over partial record.
    pub async fn run(&mut self, cancel: Option<&CancellationToken>) -> CsvResult<IngestionResult> {
        if self.state != PipelineState::Idle {
            return Err(CsvIngestError::InvalidConfig(
                "pipeline already ran; start a new call".into(),
            ));
        }
        self.transition(PipelineState::Streaming);

        match self.stream(cancel).await {
            Ok(outcome) => {
                let state = if outcome.is_complete() {
                    PipelineState::Complete
                } else {
                    PipelineState::LimitExceeded
                };
                self.transition(state);
                tracing::info!(
                    rows = outcome.rows().len(),
                    chunks = self.chunks.chunks_read(),
                    bytes = self.chunks.bytes_read(),
                    complete = outcome.is_complete(),
                    "ingestion finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.rows = Vec::new();
                self.transition(PipelineState::Failed);
                tracing::warn!(error = %e, bytes = self.chunks.bytes_read(), "ingestion failed");
                Err(e)
            }
        }
    }

    async fn stream(&mut self, cancel: Option<&CancellationToken>) -> CsvResult<IngestionResult> {
        loop {
            let next = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(CsvIngestError::Cancelled),
                    chunk = self.chunks.next_chunk() => chunk?,
                },
                None => self.chunks.next_chunk().await?,
            };
            let Some(chunk) = next else { break };
            tracing::debug!(
                chunk = self.chunks.chunks_read(),
                len = chunk.len(),
                carryover = self.parser.carryover_len(),
                "read chunk"
            );

            let rows = self.parser.feed(&chunk)?;
            if let Absorbed::Breached = self.absorb(rows)? {
                return Ok(self.limit_exceeded());
            }
            if self.row_cap.is_some_and(|cap| self.rows.len() >= cap) {
                tracing::debug!(rows = self.rows.len(), "row cap reached");
                return Ok(self.complete());
            }
        }

        let rows = self.parser.finish()?;
        if let Absorbed::Breached = self.absorb(rows)? {
            return Ok(self.limit_exceeded());
        }
        Ok(self.complete())
    }

    fn absorb(&mut self, rows: Rows) -> CsvResult<Absorbed> {
        for row in rows {
            self.rows.push(row?);
            if !self.guard.allows(self.rows.len()) {
                return Ok(Absorbed::Breached);
            }
        }
        Ok(Absorbed::Continue)
    }

    fn complete(&mut self) -> IngestionResult {
        let mut rows = std::mem::take(&mut self.rows);
        if let Some(cap) = self.row_cap {
            rows.truncate(cap);
        }
        IngestionResult::Complete(rows)
    }

    fn limit_exceeded(&mut self) -> IngestionResult {
        tracing::warn!(
            rows = self.rows.len(),
            max_rows = self.guard.max_rows(),
            "row limit exceeded, stopping upload early"
        );
        IngestionResult::LimitExceeded(std::mem::take(&mut self.rows))
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::trace!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }
}

/// Ingest an upload with explicit limits and otherwise default options.
pub async fn ingest<R>(
    reader: R,
    rows_limit: usize,
    chunk_size_bytes: usize,
) -> CsvResult<IngestionResult>
where
    R: AsyncRead + Unpin,
{
    ingest_with(reader, &IngestConfig::new(rows_limit, chunk_size_bytes)).await
}

#[tracing::instrument(
    name = "ingest",
    skip_all,
    fields(rows_limit = config.rows_limit, chunk_size = config.chunk_size_bytes)
)]
pub async fn ingest_with<R>(reader: R, config: &IngestConfig) -> CsvResult<IngestionResult>
where
    R: AsyncRead + Unpin,
{
    let mut pipeline = IngestionPipeline::new(reader, config)?;
    pipeline.run(None).await
}

/// Like [`ingest_with`], but stops with [`CsvIngestError::Cancelled`] as soon
/// as `cancel` fires, releasing the upload stream.
#[tracing::instrument(
    name = "ingest",
    skip_all,
    fields(rows_limit = config.rows_limit, chunk_size = config.chunk_size_bytes)
)]
pub async fn ingest_cancellable<R>(
    reader: R,
    config: &IngestConfig,
    cancel: CancellationToken,
) -> CsvResult<IngestionResult>
where
    R: AsyncRead + Unpin,
{
    let mut pipeline = IngestionPipeline::new(reader, config)?;
    let result = pipeline.run(Some(&cancel)).await;
    if let Err(CsvIngestError::Cancelled) = &result {
        tracing::warn!("ingestion cancelled by caller");
    }
    result
}
