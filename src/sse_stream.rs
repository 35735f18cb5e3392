//! Stream adapter for parsing SSE (Server-Sent Events) from byte chunks.

use crate::Error;
use futures_util::{Stream, StreamExt};
use memchr::memmem;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Upper bound on bytes buffered while waiting for an event terminator.
pub const MAX_BUFFER_SIZE: usize = 1_000_000;

/// A Server-Sent Events (SSE) event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Event type (optional).
    pub event_type: Option<String>,
    /// Event data.
    pub data: String,
    /// Event ID (optional).
    pub id: Option<String>,
    /// Retry delay in milliseconds (optional).
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Create a new SSE event with just data.
    pub fn new(data: String) -> Self {
        Self {
            event_type: None,
            data,
            id: None,
            retry: None,
        }
    }

    /// Check if this is a "done" sentinel event.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// A stream adapter that parses SSE events from a byte stream.
/// Maintains internal state to handle events split across chunks.
pub struct SseStream<S> {
    /// The underlying byte stream
    inner: S,
    /// Buffer for incomplete raw bytes from previous chunks
    buffer: Vec<u8>,
    /// Parsed events (or per-event decode failures) ready to be yielded
    events: VecDeque<Result<SseEvent, Error>>,
    /// Set once the inner stream has ended or failed
    finished: bool,
}

impl<S> SseStream<S> {
    /// Create a new SSE stream from a byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            events: VecDeque::new(),
            finished: false,
        }
    }

    /// Parse complete SSE events from the buffer.
    fn parse_buffer(&mut self) {
        let separator = b"\n\n";
        let finder = memmem::Finder::new(separator);
        let mut start = 0;

        while let Some(pos) = finder.find(&self.buffer[start..]) {
            let event_end = start + pos;
            let parsed = Self::parse_event_bytes(&self.buffer[start..event_end]);
            if let Some(parsed) = parsed {
                self.events.push_back(parsed);
            }
            start = event_end + separator.len();
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
    }

    fn parse_event_bytes(event_bytes: &[u8]) -> Option<Result<SseEvent, Error>> {
        match std::str::from_utf8(event_bytes) {
            Ok(text) => Self::parse_single_event(text).map(Ok),
            Err(e) => Some(Err(Error::decode(
                String::from_utf8_lossy(event_bytes),
                format!("invalid UTF-8 in SSE event: {e}"),
            ))),
        }
    }

    /// Parse a single complete SSE event from its text representation.
    pub fn parse_single_event(event_text: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_lines = Vec::new();
        let mut id = None;
        let mut retry = None;

        for line in event_text.lines() {
            let line = line.trim_end();

            // Comments start with ':'
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "event" => event_type = Some(value.to_string()),
                "data" => data_lines.push(value.to_string()),
                "id" => id = Some(value.to_string()),
                "retry" => retry = value.parse().ok(),
                _ => {}
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
            id,
            retry,
        })
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Error>,
{
    type Item = Result<SseEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Poll::Ready(Some(event));
            }

            if self.finished {
                return Poll::Ready(None);
            }

            let chunk = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Poll::Ready(Some(Err(e.into())));
                }
                None => {
                    self.finished = true;
                    // The last event may arrive without its trailing blank line.
                    let rest = std::mem::take(&mut self.buffer);
                    if !rest.iter().all(u8::is_ascii_whitespace) {
                        if let Some(parsed) = Self::parse_event_bytes(&rest) {
                            self.events.push_back(parsed);
                        }
                    }
                    continue;
                }
            };

            // CR and CRLF line endings are folded to LF.
            self.buffer
                .extend(chunk.iter().copied().filter(|b| *b != b'\r'));

            self.parse_buffer();

            // Only an unterminated event counts against the limit.
            if self.buffer.len() > MAX_BUFFER_SIZE {
                self.buffer.clear();
                self.finished = true;
                self.events
                    .push_back(Err(Error::streaming("SSE buffer exceeded maximum size")));
            }
        }
    }
}

/// Extension trait to add SSE parsing to byte streams.
pub trait SseStreamExt: Stream {
    /// Parse this byte stream as SSE events.
    fn sse_events(self) -> SseStream<Self>
    where
        Self: Sized,
    {
        SseStream::new(self)
    }
}

impl<S: Stream> SseStreamExt for S {}
