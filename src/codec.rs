use encoding_rs::{DecoderResult, Encoding};

use crate::{CsvIngestError, CsvResult};

/// Strict, incremental byte-to-text decoder.
///
/// A multi-byte sequence cut by a chunk edge is kept inside the decoder and
/// completed by the next call, so splitting input at any byte offset yields
/// the same text. Malformed input is an error, never replaced.
pub struct TextDecoder {
    encoding: &'static Encoding,
    decoder: encoding_rs::Decoder,
    consumed: u64,
}

impl TextDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            // BOM sniffing: a UTF-8/UTF-16 BOM at the start of the upload is stripped.
            decoder: encoding.new_decoder(),
            consumed: 0,
        }
    }

    /// Decode `src`, appending to `out`. `last` flushes any pending partial
    /// sequence, which is then an error if incomplete.
    pub fn decode_into(&mut self, src: &[u8], out: &mut String, last: bool) -> CsvResult<()> {
        let mut src = src;
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length_without_replacement(src.len())
                .unwrap_or_else(|| src.len().saturating_mul(3).saturating_add(4));
            out.reserve(needed);

            let (result, read) = self
                .decoder
                .decode_to_string_without_replacement(src, out, last);
            self.consumed += read as u64;
            src = &src[read..];

            match result {
                DecoderResult::InputEmpty => return Ok(()),
                DecoderResult::OutputFull => continue,
                DecoderResult::Malformed(bad, trailing) => {
                    let offset = self
                        .consumed
                        .saturating_sub(u64::from(bad) + u64::from(trailing));
                    return Err(CsvIngestError::Encoding {
                        encoding: self.encoding.name(),
                        offset,
                    });
                }
            }
        }
    }
}
