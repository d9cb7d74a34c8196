//! In-memory codec streams.
//!
//! The codec reads and writes through four callbacks (read, seek, skip,
//! write). `StreamIo` is that contract; `MemoryStream` is its one
//! implementation, backed by a borrowed source buffer when decoding and by a
//! single owned output chunk when encoding.

use std::borrow::Cow;

use thiserror::Error;

/// Errors raised by a memory stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A second write on an encode stream. Output is one chunk only.
    #[error("Output too big: stream holds a single {capacity}-byte chunk, rejected a further {attempted}-byte write")]
    CapacityExceeded { capacity: usize, attempted: usize },

    /// Write on a decode stream
    #[error("Stream is read-only")]
    ReadOnly,
}

/// The stream callbacks the codec drives.
pub trait StreamIo {
    /// Copy up to `buf.len()` bytes from the cursor, returning the count.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Move the cursor to an absolute offset. `false` if past the end.
    fn seek(&mut self, offset: u64) -> bool;

    /// Advance the cursor by up to `n` bytes, returning the distance moved.
    fn skip(&mut self, n: u64) -> u64;

    /// Store `buf` as the stream's output.
    fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Decode,
    Encode,
}

/// A stream over one contiguous buffer.
#[derive(Debug)]
pub struct MemoryStream<'a> {
    buffer: Cow<'a, [u8]>,
    cursor: usize,
    direction: Direction,
    written: bool,
    violation: Option<StreamError>,
}

impl<'a> MemoryStream<'a> {
    /// A decode stream reading `source`.
    pub fn reader(source: &'a [u8]) -> Self {
        Self {
            buffer: Cow::Borrowed(source),
            cursor: 0,
            direction: Direction::Decode,
            written: false,
            violation: None,
        }
    }

    /// An encode stream accepting exactly one write.
    pub fn writer() -> MemoryStream<'static> {
        MemoryStream {
            buffer: Cow::Owned(Vec::new()),
            cursor: 0,
            direction: Direction::Encode,
            written: false,
            violation: None,
        }
    }

    /// Total buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Bytes between the cursor and the end.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// The first rejected write, if any.
    pub fn violation(&self) -> Option<&StreamError> {
        self.violation.as_ref()
    }

    /// The written chunk of an encode stream.
    pub fn into_output(self) -> Option<Vec<u8>> {
        match (self.direction, self.written) {
            (Direction::Encode, true) => Some(self.buffer.into_owned()),
            _ => None,
        }
    }

    fn reject(&mut self, error: StreamError) -> Result<usize, StreamError> {
        if self.violation.is_none() {
            self.violation = Some(error.clone());
        }
        Err(error)
    }
}

impl StreamIo for MemoryStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.buffer[self.cursor..self.cursor + n]);
        self.cursor += n;
        n
    }

    fn seek(&mut self, offset: u64) -> bool {
        match usize::try_from(offset) {
            Ok(offset) if offset <= self.buffer.len() => {
                self.cursor = offset;
                true
            }
            _ => false,
        }
    }

    fn skip(&mut self, n: u64) -> u64 {
        let n = usize::try_from(n).unwrap_or(usize::MAX).min(self.remaining());
        self.cursor += n;
        n as u64
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        if self.direction == Direction::Decode {
            return self.reject(StreamError::ReadOnly);
        }

        if self.written {
            let capacity = self.buffer.len();
            log::error!(
                "Output too big: only a single chunk write is supported ({} bytes already written)",
                capacity
            );
            return self.reject(StreamError::CapacityExceeded {
                capacity,
                attempted: buf.len(),
            });
        }

        self.buffer = Cow::Owned(buf.to_vec());
        self.cursor = self.buffer.len();
        self.written = true;
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_clamps_to_remaining() {
        let data = [1u8, 2, 3, 4, 5];
        let mut stream = MemoryStream::reader(&data);

        let mut buf = [0u8; 3];
        assert_eq!(stream.read(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(stream.remaining(), 2);

        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(stream.read(&mut buf), 0);
    }

    #[test]
    fn test_seek_within_and_past_end() {
        let data = [0u8; 10];
        let mut stream = MemoryStream::reader(&data);

        assert!(stream.seek(4));
        assert_eq!(stream.position(), 4);
        assert_eq!(stream.remaining(), 6);

        assert!(stream.seek(10));
        assert_eq!(stream.remaining(), 0);

        assert!(!stream.seek(11));
        assert_eq!(stream.position(), 10);
    }

    #[test]
    fn test_skip_clamps() {
        let data = [0u8; 10];
        let mut stream = MemoryStream::reader(&data);

        assert_eq!(stream.skip(3), 3);
        assert_eq!(stream.skip(100), 7);
        assert_eq!(stream.remaining(), 0);
        assert_eq!(stream.skip(1), 0);
    }

    #[test]
    fn test_single_write_allocates_exact_buffer() {
        let mut stream = MemoryStream::writer();
        assert_eq!(stream.write(&[9, 8, 7]), Ok(3));
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.into_output(), Some(vec![9, 8, 7]));
    }

    #[test]
    fn test_second_write_is_capacity_violation() {
        let mut stream = MemoryStream::writer();
        stream.write(&[1, 2]).unwrap();

        let err = stream.write(&[3, 4, 5]).unwrap_err();
        assert_eq!(
            err,
            StreamError::CapacityExceeded {
                capacity: 2,
                attempted: 3
            }
        );
        assert_eq!(stream.violation(), Some(&err));
        // First chunk is left untouched, not truncated or extended.
        assert_eq!(stream.into_output(), Some(vec![1, 2]));
    }

    #[test]
    fn test_reader_rejects_write() {
        let data = [1u8];
        let mut stream = MemoryStream::reader(&data);
        assert_eq!(stream.write(&[2]), Err(StreamError::ReadOnly));
        assert!(stream.into_output().is_none());
    }

    #[test]
    fn test_unwritten_writer_has_no_output() {
        assert!(MemoryStream::writer().into_output().is_none());
    }
}
