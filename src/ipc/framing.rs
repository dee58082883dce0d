//! Terminator-delimited message framing over byte streams.
//!
//! # Wire Format
//!
//! ```text
//! <utf8 json envelope>end<utf8 json envelope>end...
//! ```
//!
//! There is no length prefix. The reader pulls fixed-size chunks off the
//! stream and scans its buffer for the terminator; everything before it is
//! one frame, and anything after it stays buffered for the next call. The
//! envelope encoder guarantees the terminator never occurs inside a frame.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::ServerConfig;
use crate::envelope::find;

/// Frame transport errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the connection in the middle of a frame.
    #[error("Connection closed with {buffered} bytes of an unterminated frame")]
    Truncated {
        /// Bytes discarded
        buffered: usize,
    },

    /// No terminator within the configured maximum frame size.
    #[error("Frame exceeds maximum {max} bytes without a terminator")]
    TooLarge {
        /// Configured limit
        max: usize,
    },

    /// Underlying socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reassembles frames from a byte stream.
///
/// Owns the per-connection accumulation buffer. Dropping the reader discards
/// any partially received frame.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    buffer: Vec<u8>,
    /// Scratch space for a single socket read, reused across calls.
    chunk: Vec<u8>,
    /// Buffer prefix already known not to contain the terminator.
    scanned: usize,
    terminator: Vec<u8>,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, config: &ServerConfig) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(config.chunk_size),
            chunk: vec![0u8; config.chunk_size],
            scanned: 0,
            terminator: config.terminator.clone(),
            max_frame_size: config.max_frame_size,
        }
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next complete frame, without its terminator.
    ///
    /// Returns `Ok(None)` when the peer closes the connection between frames.
    ///
    /// # Errors
    ///
    /// - `FrameError::Truncated` if the stream ends inside a frame
    /// - `FrameError::TooLarge` if the buffer outgrows `max_frame_size`
    /// - `FrameError::Io` on socket errors
    ///
    /// The partial buffer is discarded on every error.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(Some(frame));
            }

            if self.buffer.len() > self.max_frame_size {
                self.reset();
                return Err(FrameError::TooLarge {
                    max: self.max_frame_size,
                });
            }

            let bytes_read = match self.reader.read(&mut self.chunk).await {
                Ok(n) => n,
                Err(e) => {
                    self.reset();
                    return Err(FrameError::Io(e));
                }
            };

            // EOF
            if bytes_read == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let buffered = self.buffer.len();
                self.reset();
                return Err(FrameError::Truncated { buffered });
            }

            self.buffer.extend_from_slice(&self.chunk[..bytes_read]);
        }
    }

    /// Split off the first frame if the terminator has arrived.
    fn take_frame(&mut self) -> Option<Vec<u8>> {
        match find(&self.buffer[self.scanned..], &self.terminator) {
            Some(pos) => {
                let end = self.scanned + pos;
                let frame = self.buffer[..end].to_vec();
                self.buffer.drain(..end + self.terminator.len());
                self.scanned = 0;
                Some(frame)
            }
            None => {
                // A terminator may straddle the next chunk boundary.
                self.scanned = self
                    .buffer
                    .len()
                    .saturating_sub(self.terminator.len().saturating_sub(1));
                None
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

/// Write one frame: the payload followed by the terminator.
///
/// `write_all` retries partial writes until everything is flushed or the
/// connection fails.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    terminator: &[u8],
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(payload).await?;
    writer.write_all(terminator).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::io::duplex;
    use tokio::time::timeout;

    /// Test timeout to prevent hanging tests.
    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn reader_for(chunks: &[&[u8]]) -> FrameReader<tokio_test::io::Mock> {
        let mut builder = tokio_test::io::Builder::new();
        for chunk in chunks {
            builder.read(chunk);
        }
        FrameReader::new(builder.build(), &ServerConfig::default())
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (mut client, server) = duplex(4096);

        let message = br#"{"identity":"server","version":["0.0.1","0"],"data":"hello"}"#;
        write_frame(&mut client, message, b"end")
            .await
            .expect("Write failed");

        let mut reader = FrameReader::new(server, &ServerConfig::default());
        let received = timeout(TEST_TIMEOUT, reader.read_frame())
            .await
            .expect("Test timed out")
            .expect("Read failed");

        assert_eq!(received.as_deref(), Some(&message[..]));
    }

    #[tokio::test]
    async fn test_write_frame_appends_terminator() {
        let mut mock = tokio_test::io::Builder::new()
            .write(b"{}")
            .write(b"end")
            .build();
        write_frame(&mut mock, b"{}", b"end").await.expect("Write failed");
    }

    #[tokio::test]
    async fn test_terminator_split_across_chunks() {
        let mut reader = reader_for(&[b"{\"a\":1}e", b"n", b"d"]);
        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.as_deref(), Some(&b"{\"a\":1}"[..]));
        assert_eq!(reader.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_two_frames_in_one_chunk() {
        let mut reader = reader_for(&[b"firstendsecondendthi", b"rdend"]);
        assert_eq!(reader.read_frame().await.unwrap().as_deref(), Some(&b"first"[..]));
        assert_eq!(reader.buffered(), b"secondendthi".len());
        assert_eq!(reader.read_frame().await.unwrap().as_deref(), Some(&b"second"[..]));
        assert_eq!(reader.read_frame().await.unwrap().as_deref(), Some(&b"third"[..]));
        assert_eq!(reader.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_chunk_buffer_reused_across_reads() {
        let mut reader = reader_for(&[b"oneend", b"twoend"]);
        let scratch = reader.chunk.as_ptr();
        assert_eq!(reader.chunk.len(), crate::config::CHUNK_SIZE);

        assert_eq!(reader.read_frame().await.unwrap().as_deref(), Some(&b"one"[..]));
        assert_eq!(reader.read_frame().await.unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(reader.read_frame().await.unwrap(), None);
        assert_eq!(reader.chunk.as_ptr(), scratch);
    }

    #[tokio::test]
    async fn test_empty_frame() {
        let mut reader = reader_for(&[b"end"]);
        assert_eq!(reader.read_frame().await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_truncated_frame_discards_buffer() {
        let mut reader = reader_for(&[b"{\"data\":", b"\"partial\"}en"]);
        match reader.read_frame().await {
            Err(FrameError::Truncated { buffered }) => assert_eq!(buffered, 20),
            other => panic!("Expected Truncated, got {:?}", other),
        }
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_connection_closed_between_frames() {
        let mut reader = reader_for(&[]);
        assert_eq!(reader.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_oversized_frame() {
        let config = ServerConfig {
            max_frame_size: 16,
            chunk_size: 8,
            ..ServerConfig::default()
        };
        let mock = tokio_test::io::Builder::new()
            .read(&[b'x'; 24])
            .build();
        let mut reader = FrameReader::new(mock, &config);

        let result = timeout(TEST_TIMEOUT, reader.read_frame())
            .await
            .expect("Test timed out");
        assert!(matches!(result, Err(FrameError::TooLarge { max: 16 })));
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_reads_at_most_chunk_size() {
        let config = ServerConfig {
            chunk_size: 4,
            ..ServerConfig::default()
        };
        // The mock hands out at most what fits in the read buffer.
        let mock = tokio_test::io::Builder::new().read(b"abcdefgend").build();
        let mut reader = FrameReader::new(mock, &config);
        assert_eq!(reader.read_frame().await.unwrap().as_deref(), Some(&b"abcdefg"[..]));
    }
}
