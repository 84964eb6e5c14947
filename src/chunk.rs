use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Pulls chunks of at most `chunk_size` bytes from an upload stream.
///
/// Only one chunk is in flight at a time; memory use is bounded by the chunk
/// size, not by the upload.
pub struct ChunkReader<R> {
    reader: R,
    buf: BytesMut,
    chunk_size: usize,
    exhausted: bool,
    chunks_read: u64,
    bytes_read: u64,
}

impl<R> ChunkReader<R>
where
    R: AsyncRead + Unpin,
{
    /// `chunk_size` must be non-zero; a zero-sized read would look like end of stream.
    pub fn new(reader: R, chunk_size: usize) -> Self {
        debug_assert!(chunk_size > 0);
        Self {
            reader,
            buf: BytesMut::with_capacity(chunk_size),
            chunk_size,
            exhausted: false,
            chunks_read: 0,
            bytes_read: 0,
        }
    }

    /// Next chunk, or `None` once a read returns zero bytes.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.exhausted {
            return Ok(None);
        }

        self.buf.reserve(self.chunk_size);
        let n = {
            let mut limited = (&mut self.buf).limit(self.chunk_size);
            self.reader.read_buf(&mut limited).await?
        };
        if n == 0 {
            self.exhausted = true;
            return Ok(None);
        }

        self.chunks_read += 1;
        self.bytes_read += n as u64;
        Ok(Some(self.buf.split().freeze()))
    }

    pub fn chunks_read(&self) -> u64 {
        self.chunks_read
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}
