//! Chunk-at-a-time CSV parsing.
//!
//! Bytes are decoded incrementally, the dialect is sniffed from the first
//! non-empty text and then frozen, and only text up to the last record
//! terminator outside a quoted field is handed to the CSV reader. The rest is
//! carried over and prepended to the next chunk, so a record is never split
//! between two parse calls.

use std::io::Cursor;

use encoding_rs::Encoding;
use memchr::{memchr, memchr3};

use crate::codec::TextDecoder;
use crate::dialect::Dialect;
use crate::{CsvIngestError, CsvResult, Row};

pub struct IncrementalCsvParser {
    decoder: TextDecoder,
    dialect: Option<Dialect>,
    carryover: String,
    // Scan state over `carryover`, so text is only scanned once.
    scanned: usize,
    scan: Scan,
}

/// Record-boundary scanner state, following the CSV reader's rules: a quote
/// only opens a quoted field at field start, `""` inside one is an escaped
/// quote, and `\r` or `\n` outside quotes ends a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    RecordStart,
    FieldStart,
    Unquoted,
    Quoted,
    // A quote seen inside a quoted field: closes it unless another follows.
    QuoteInQuoted,
}

impl IncrementalCsvParser {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: TextDecoder::new(encoding),
            dialect: None,
            carryover: String::new(),
            scanned: 0,
            scan: Scan::RecordStart,
        }
    }

    /// Skip sniffing and parse with a known dialect.
    pub fn with_dialect(encoding: &'static Encoding, dialect: Dialect) -> Self {
        Self {
            dialect: Some(dialect),
            ..Self::new(encoding)
        }
    }

    pub fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    /// Bytes of unterminated text currently held for the next chunk.
    pub fn carryover_len(&self) -> usize {
        self.carryover.len()
    }

    /// Feed one chunk; returns the rows it completes, parsed lazily.
    pub fn feed(&mut self, chunk: &[u8]) -> CsvResult<Rows> {
        let start = self.carryover.len();
        self.decoder.decode_into(chunk, &mut self.carryover, false)?;

        let dialect = match self.dialect {
            Some(d) => d,
            None if self.carryover.is_empty() => return Ok(Rows::empty()),
            None => {
                let d = Dialect::sniff(&self.carryover[start..]);
                tracing::debug!(
                    delimiter = %char::from(d.delimiter).escape_default(),
                    quote = %char::from(d.quote),
                    "sniffed csv dialect"
                );
                self.dialect = Some(d);
                d
            }
        };

        match self.last_record_end(dialect) {
            Some(end) => {
                let complete: String = self.carryover.drain(..end).collect();
                self.scanned = self.carryover.len();
                Ok(Rows::parse(complete, dialect))
            }
            None => Ok(Rows::empty()),
        }
    }

    /// End of stream: flush the decoder and parse whatever is left.
    pub fn finish(&mut self) -> CsvResult<Rows> {
        self.decoder.decode_into(&[], &mut self.carryover, true)?;
        if self.carryover.is_empty() {
            return Ok(Rows::empty());
        }
        let dialect = *self
            .dialect
            .get_or_insert_with(|| Dialect::sniff(&self.carryover));
        if self.scan == Scan::Quoted {
            tracing::debug!(
                pending = self.carryover.len(),
                "stream ended inside a quoted field"
            );
        }
        let rest = std::mem::take(&mut self.carryover);
        self.scanned = 0;
        self.scan = Scan::RecordStart;
        Ok(Rows::parse(rest, dialect))
    }

    /// Offset just past the last record terminator outside a quoted field.
    fn last_record_end(&mut self, dialect: Dialect) -> Option<usize> {
        let Dialect { delimiter, quote } = dialect;
        let bytes = self.carryover.as_bytes();
        let mut pos = self.scanned;
        let mut end = None;

        while pos < bytes.len() {
            match self.scan {
                Scan::Quoted => match memchr(quote, &bytes[pos..]) {
                    Some(off) => {
                        pos += off + 1;
                        self.scan = Scan::QuoteInQuoted;
                    }
                    None => pos = bytes.len(),
                },
                Scan::Unquoted => match memchr3(delimiter, b'\n', b'\r', &bytes[pos..]) {
                    Some(off) => {
                        let at = pos + off;
                        pos = at + 1;
                        if bytes[at] == delimiter {
                            self.scan = Scan::FieldStart;
                        } else {
                            self.scan = Scan::RecordStart;
                            end = Some(pos);
                        }
                    }
                    None => pos = bytes.len(),
                },
                _ => {
                    let b = bytes[pos];
                    pos += 1;
                    self.scan = if b == b'\n' || b == b'\r' {
                        end = Some(pos);
                        Scan::RecordStart
                    } else if b == quote {
                        // Opens a quoted field, or re-enters one after `""`.
                        Scan::Quoted
                    } else if b == delimiter {
                        Scan::FieldStart
                    } else {
                        Scan::Unquoted
                    };
                }
            }
        }
        self.scanned = bytes.len();
        end
    }
}

/// Lazily parsed rows of one complete block of text.
pub struct Rows {
    records: Option<csv::StringRecordsIntoIter<Cursor<String>>>,
}

impl Rows {
    fn empty() -> Self {
        Self { records: None }
    }

    fn parse(text: String, dialect: Dialect) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(dialect.delimiter)
            .quote(dialect.quote)
            .from_reader(Cursor::new(text));
        Self {
            records: Some(reader.into_records()),
        }
    }
}

impl Iterator for Rows {
    type Item = CsvResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.as_mut()?.next()?;
        Some(
            record
                .map(|r| r.iter().map(str::to_owned).collect())
                .map_err(CsvIngestError::from),
        )
    }
}
