//! Byte pattern search over a refilling window
//!
//! `index_of` is the pure search. `Scanner` wraps an async reader with a
//! fixed-capacity buffer and keeps enough trailing bytes between refills
//! that a pattern split across two reads is still found.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// First index at which `needle` occurs in `haystack`.
///
/// An empty needle, or one longer than the haystack, is never found.
pub fn index_of(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Result of [`Scanner::read_line`]
#[derive(Debug, PartialEq, Eq)]
pub enum LineRead {
    /// Line contents without the terminating `\n` (and `\r`, if any)
    Line(Vec<u8>),
    /// The line grew past the caller's limit
    TooLong,
    /// Input ended before a line feed
    Exhausted,
}

/// Result of [`Scanner::read_until`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntilRead {
    Found,
    Exhausted,
    LimitExceeded,
}

/// Fixed-size window over an async byte stream
pub struct Scanner<R> {
    reader: R,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> Scanner<R> {
    /// Create a scanner holding at most `capacity` bytes at a time
    pub fn new(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buf: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
            eof: false,
        }
    }

    /// Bytes read from the stream but not yet consumed
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Move the unconsumed tail to the front and read more behind it.
    async fn refill(&mut self) -> io::Result<usize> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        if self.end == self.buf.len() {
            return Err(io::Error::other("scan window full"));
        }

        let read = self.reader.read(&mut self.buf[self.end..]).await?;
        if read == 0 {
            self.eof = true;
        }
        self.end += read;
        Ok(read)
    }

    /// Advance to the first occurrence of `pattern`, leaving it unconsumed.
    ///
    /// Returns `false` once the stream is exhausted without a match.
    pub async fn seek(&mut self, pattern: &[u8]) -> io::Result<bool> {
        let keep_len = pattern.len().saturating_sub(1);
        loop {
            if let Some(index) = index_of(self.pending(), pattern) {
                self.start += index;
                return Ok(true);
            }
            if self.eof {
                return Ok(false);
            }
            let keep = keep_len.min(self.end - self.start);
            self.start = self.end - keep;
            self.refill().await?;
        }
    }

    /// Consume through the next `\n`.
    pub async fn read_line(&mut self, limit: usize) -> io::Result<LineRead> {
        let mut line = Vec::new();
        loop {
            let pending = &self.buf[self.start..self.end];
            if let Some(index) = pending.iter().position(|&b| b == b'\n') {
                if line.len() + index > limit {
                    return Ok(LineRead::TooLong);
                }
                line.extend_from_slice(&pending[..index]);
                self.start += index + 1;
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(LineRead::Line(line));
            }

            line.extend_from_slice(pending);
            self.start = self.end;
            if line.len() > limit {
                return Ok(LineRead::TooLong);
            }
            if self.eof {
                return Ok(LineRead::Exhausted);
            }
            self.refill().await?;
        }
    }

    /// Copy bytes into `sink` until `pattern` is found, then consume the
    /// pattern.
    ///
    /// The `trailer` bytes immediately preceding the pattern are dropped.
    /// They are held back between refills so they never reach `sink` early.
    /// Fails with `LimitExceeded` before `sink` would grow beyond `max`.
    pub async fn read_until(
        &mut self,
        pattern: &[u8],
        trailer: usize,
        sink: &mut Vec<u8>,
        max: usize,
    ) -> io::Result<UntilRead> {
        let keep_len = (pattern.len() + trailer).saturating_sub(1);
        loop {
            let pending = &self.buf[self.start..self.end];
            if let Some(index) = index_of(pending, pattern) {
                let take = index.saturating_sub(trailer);
                if sink.len() + take > max {
                    return Ok(UntilRead::LimitExceeded);
                }
                sink.extend_from_slice(&pending[..take]);
                self.start += index + pattern.len();
                return Ok(UntilRead::Found);
            }
            if self.eof {
                return Ok(UntilRead::Exhausted);
            }

            let emit = pending.len().saturating_sub(keep_len);
            if sink.len() + emit > max {
                return Ok(UntilRead::LimitExceeded);
            }
            sink.extend_from_slice(&pending[..emit]);
            self.start += emit;
            self.refill().await?;
        }
    }
}
