//! The byte-source seam between decoders and whatever feeds them.
//!
//! Decoders never touch files or sockets; they pull from a [`ByteSource`]. The seam carries one
//! distinction a plain reader cannot: a source that has no bytes *yet* fails with
//! [`StreamError::NotReady`], while one that will never have more fails with
//! [`StreamError::Eof`]. A streaming caller retries the former and aborts on the latter.
use core::fmt;

/// Why a source could not satisfy a read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamError {
    /// The data is not available yet; the same read may succeed later.
    NotReady,
    /// The stream has ended; no read will ever succeed again.
    Eof,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamError::NotReady => "input not available yet",
            StreamError::Eof => "end of stream",
        })
    }
}

impl core::error::Error for StreamError {}

/// A pull-style byte stream with a single resettable mark.
pub trait ByteSource {
    /// Fill `buf` from the front, returning how many trailing bytes were left unfilled.
    ///
    /// `Ok(0)` is a full read. A nonzero count means the stream ended mid-buffer; the filled
    /// prefix is valid. `Err(NotReady)` promises nothing was consumed.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, StreamError>;

    /// Remember the current position. A later mark replaces an earlier one.
    fn mark(&mut self);

    /// Rewind to the last [`mark`](Self::mark).
    fn reset_to_mark(&mut self) -> Result<(), StreamError>;

    /// Bytes that can be read right now without blocking.
    fn available(&self) -> usize;
}

/// An in-memory [`ByteSource`] over a borrowed slice.
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
    mark: Option<usize>,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceSource {
            data,
            pos: 0,
            mark: None,
        }
    }

    /// Position of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl ByteSource for SliceSource<'_> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let have = self.data.len() - self.pos;
        let take = buf.len().min(have);
        buf[..take].copy_from_slice(&self.data[self.pos..self.pos + take]);
        self.pos += take;
        Ok(buf.len() - take)
    }

    fn mark(&mut self) {
        self.mark = Some(self.pos);
    }

    fn reset_to_mark(&mut self) -> Result<(), StreamError> {
        match self.mark {
            Some(at) => {
                self.pos = at;
                Ok(())
            }
            None => Err(StreamError::Eof),
        }
    }

    fn available(&self) -> usize {
        self.data.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reads_report_the_shortfall() {
        let mut source = SliceSource::new(&[1, 2, 3]);
        let mut buf = [0u8; 2];
        assert_eq!(source.read_bytes(&mut buf), Ok(0));
        assert_eq!(buf, [1, 2]);
        assert_eq!(source.read_bytes(&mut buf), Ok(1));
        assert_eq!(buf[0], 3);
        assert_eq!(source.available(), 0);
    }

    #[test]
    fn mark_and_reset_rewind() {
        let mut source = SliceSource::new(&[9, 8, 7, 6]);
        let mut one = [0u8; 1];
        source.read_bytes(&mut one).unwrap();
        source.mark();
        source.read_bytes(&mut one).unwrap();
        source.read_bytes(&mut one).unwrap();
        assert_eq!(one, [7]);
        source.reset_to_mark().unwrap();
        source.read_bytes(&mut one).unwrap();
        assert_eq!(one, [8]);
    }
}
