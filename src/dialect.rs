//! Delimiter/quote sniffing over the first decoded text of an upload.

use memchr::memchr;

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];

/// CSV formatting rules fixed for the lifetime of one ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl Dialect {
    /// Infer a dialect from a sample, normally the first chunk.
    ///
    /// Only the first line is inspected for the delimiter: the candidate seen
    /// most often outside quotes wins, ties go to the earlier candidate in
    /// `, \t ; |` order, and a line with none of them falls back to comma.
    pub fn sniff(sample: &str) -> Self {
        let bytes = sample.as_bytes();
        let quote = sniff_quote(bytes);
        let first_line = match memchr(b'\n', bytes) {
            Some(end) => &bytes[..end],
            None => bytes,
        };

        let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
        let mut in_quotes = false;
        for &b in first_line {
            if b == quote {
                in_quotes = !in_quotes;
                continue;
            }
            if in_quotes {
                continue;
            }
            if let Some(idx) = CANDIDATE_DELIMITERS.iter().position(|&d| d == b) {
                counts[idx] += 1;
            }
        }

        let mut best = 0usize;
        for idx in 1..counts.len() {
            if counts[idx] > counts[best] {
                best = idx;
            }
        }
        let delimiter = if counts[best] == 0 {
            b','
        } else {
            CANDIDATE_DELIMITERS[best]
        };

        Self { delimiter, quote }
    }
}

/// Double quote unless the sample has none and opens a field with `'`.
fn sniff_quote(bytes: &[u8]) -> u8 {
    if memchr(b'"', bytes).is_some() {
        return b'"';
    }
    let opens_single = bytes.iter().enumerate().any(|(i, &b)| {
        b == b'\''
            && (i == 0
                || matches!(bytes[i - 1], b'\n' | b'\r')
                || CANDIDATE_DELIMITERS.contains(&bytes[i - 1]))
    });
    if opens_single {
        b'\''
    } else {
        b'"'
    }
}
