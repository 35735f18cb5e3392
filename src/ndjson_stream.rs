//! Stream adapter splitting a byte stream into newline-delimited JSON lines.

use crate::Error;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pub use crate::sse_stream::MAX_BUFFER_SIZE;

/// A stream adapter yielding one complete, non-blank line at a time.
///
/// Lines split across chunks are buffered until their terminating `\n`
/// arrives. A trailing `\r` is stripped. Content is not parsed here, only
/// checked for valid UTF-8.
pub struct NdjsonStream<S> {
    inner: S,
    buffer: Vec<u8>,
    lines: VecDeque<Result<String, Error>>,
    finished: bool,
}

impl<S> NdjsonStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            lines: VecDeque::new(),
            finished: false,
        }
    }

    fn parse_buffer(&mut self) {
        let mut start = 0;
        while let Some(pos) = memchr::memchr(b'\n', &self.buffer[start..]) {
            let line_end = start + pos;
            if let Some(line) = Self::decode_line(&self.buffer[start..line_end]) {
                self.lines.push_back(line);
            }
            start = line_end + 1;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
    }

    fn decode_line(bytes: &[u8]) -> Option<Result<String, Error>> {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(e) => Err(Error::decode(
                String::from_utf8_lossy(bytes),
                format!("invalid UTF-8 in line: {e}"),
            )),
        })
    }
}

impl<S, E> Stream for NdjsonStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Error>,
{
    type Item = Result<String, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(line) = self.lines.pop_front() {
                return Poll::Ready(Some(line));
            }

            if self.finished {
                return Poll::Ready(None);
            }

            match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    self.buffer.extend_from_slice(&chunk);
                    self.parse_buffer();
                    // Only an unterminated line counts against the limit.
                    if self.buffer.len() > MAX_BUFFER_SIZE {
                        self.buffer.clear();
                        self.finished = true;
                        self.lines.push_back(Err(Error::streaming(
                            "line buffer exceeded maximum size",
                        )));
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Poll::Ready(Some(Err(e.into())));
                }
                None => {
                    self.finished = true;
                    // Final line without a trailing newline.
                    let rest = std::mem::take(&mut self.buffer);
                    if let Some(line) = Self::decode_line(&rest) {
                        self.lines.push_back(line);
                    }
                }
            }
        }
    }
}

/// Extension trait to add line splitting to byte streams.
pub trait NdjsonStreamExt: Stream {
    fn ndjson_lines(self) -> NdjsonStream<Self>
    where
        Self: Sized,
    {
        NdjsonStream::new(self)
    }
}

impl<S: Stream> NdjsonStreamExt for S {}
