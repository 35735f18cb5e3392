//! Turns a generation response body into [`StreamEvent`]s.
//!
//! The service answers in one of three framings depending on endpoint and
//! version: a single JSON document, server-sent events, or newline-delimited
//! JSON. Every framing carries the same unit shape ([`GenerationChunk`]), so
//! only the splitting differs.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{future, Stream, StreamExt};

use super::types::{GenerationChunk, StopReason};
use crate::ndjson_stream::NdjsonStreamExt;
use crate::sse_stream::SseStreamExt;
use crate::{Error, StreamEvent};

/// A decoded, lazily produced sequence of events.
pub type EventStream = BoxStream<'static, Result<StreamEvent, Error>>;

/// Leading bytes that can only start a server-sent events body.
const SSE_FIELDS: [&[u8]; 5] = [b"data:", b"event:", b"id:", b"retry:", b":"];

/// How a response body is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// One JSON object for the whole body.
    Document,
    /// One JSON object per line.
    Ndjson,
    /// `data:` frames separated by blank lines.
    Sse,
}

impl WireFormat {
    /// Pick a framing from a `Content-Type` header value.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/event-stream" => Some(WireFormat::Sse),
            "application/x-ndjson"
            | "application/ndjson"
            | "application/jsonl"
            | "application/json-seq"
            | "application/stream+json" => Some(WireFormat::Ndjson),
            "application/json" => Some(WireFormat::Document),
            _ => None,
        }
    }

    /// Guess the framing from the first bytes of a body.
    ///
    /// Returns `None` while more input is needed. `complete` signals that
    /// `prefix` is the entire body.
    pub fn sniff(prefix: &[u8], complete: bool) -> Option<Self> {
        let Some(start) = prefix.iter().position(|b| !b.is_ascii_whitespace()) else {
            // Nothing but whitespace decodes to nothing under line framing.
            return complete.then_some(WireFormat::Ndjson);
        };
        let head = &prefix[start..];

        if SSE_FIELDS.iter().any(|field| head.starts_with(field)) {
            return Some(WireFormat::Sse);
        }
        if !complete && SSE_FIELDS.iter().any(|field| field.starts_with(head)) {
            return None;
        }

        match memchr::memchr(b'\n', head) {
            Some(end) if serde_json::from_slice::<serde_json::Value>(&head[..end]).is_ok() => {
                Some(WireFormat::Ndjson)
            }
            Some(_) => Some(WireFormat::Document),
            None if complete => Some(WireFormat::Document),
            None => None,
        }
    }
}

/// Decode a response body, choosing the framing from `content_type` or, when
/// that is absent or unrecognised, by probing the first line of the body.
pub fn decode<S, E>(body: S, content_type: Option<&str>) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Into<Error> + Send + 'static,
{
    match content_type.and_then(WireFormat::from_content_type) {
        Some(format) => {
            tracing::debug!(?format, "decoding response by content type");
            decode_as(format, body)
        }
        None => probe(body),
    }
}

/// Decode a response body with a known framing.
pub fn decode_as<S, E>(format: WireFormat, body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Into<Error> + Send + 'static,
{
    match format {
        WireFormat::Document => decode_document(body),
        WireFormat::Ndjson => body
            .ndjson_lines()
            .map(|line| match line {
                Ok(line) => unit_events(&line),
                Err(e) => vec![Err(e)],
            })
            .flat_map(stream::iter)
            .boxed(),
        WireFormat::Sse => body
            .sse_events()
            .take_while(|event| future::ready(!matches!(event, Ok(e) if e.is_done())))
            .map(|event| match event {
                Ok(event) => unit_events(&event.data),
                Err(e) => vec![Err(e)],
            })
            .flat_map(stream::iter)
            .boxed(),
    }
}

fn decode_document<S, E>(mut body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Into<Error> + Send + 'static,
{
    stream::once(async move {
        let mut buffer = Vec::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => buffer.extend_from_slice(&chunk),
                Err(e) => return vec![Err(e.into())],
            }
        }
        match serde_json::from_slice::<GenerationChunk>(&buffer) {
            Ok(chunk) => chunk_events(chunk),
            // Atomic framing: nothing is salvageable from a broken document.
            Err(e) => vec![Err(Error::decode(
                String::from_utf8_lossy(&buffer),
                e.to_string(),
            ))],
        }
    })
    .flat_map(stream::iter)
    .boxed()
}

fn probe<S, E>(mut body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Into<Error> + Send + 'static,
{
    stream::once(async move {
        let mut prefix = Vec::new();
        let format = loop {
            if let Some(format) = WireFormat::sniff(&prefix, false) {
                break format;
            }
            match body.next().await {
                Some(Ok(chunk)) => prefix.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    let error: Error = e.into();
                    return stream::iter(vec![Err::<StreamEvent, _>(error)]).boxed();
                }
                None => {
                    break WireFormat::sniff(&prefix, true).unwrap_or(WireFormat::Document)
                }
            }
        };
        tracing::debug!(?format, "probed response framing");

        let replay = stream::iter(vec![Ok::<_, E>(Bytes::from(prefix))]).chain(body);
        decode_as(format, replay)
    })
    .flatten()
    .boxed()
}

/// Decode one framed unit (an SSE `data` payload or an NDJSON line).
///
/// A unit that is not valid JSON yields a single recoverable
/// [`Error::Decode`]; blank units yield nothing.
pub fn unit_events(unit: &str) -> Vec<Result<StreamEvent, Error>> {
    let unit = unit.trim();
    if unit.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<GenerationChunk>(unit) {
        Ok(chunk) => chunk_events(chunk),
        Err(e) => vec![Err(Error::decode(unit, e.to_string()))],
    }
}

fn chunk_events(chunk: GenerationChunk) -> Vec<Result<StreamEvent, Error>> {
    let mut events = Vec::new();

    if !chunk.errors.is_empty() {
        let message = chunk
            .errors
            .iter()
            .map(|e| match &e.code {
                Some(code) => format!("{code}: {}", e.message),
                None => e.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        events.push(Err(Error::provider("watsonx", message)));
    }

    if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
        events.push(Ok(StreamEvent::ContentDelta { delta: content }));
    }

    for result in chunk.results {
        let usage = result.usage();
        if !result.generated_text.is_empty() {
            events.push(Ok(StreamEvent::ContentDelta {
                delta: result.generated_text,
            }));
        }
        if let Some(finish_reason) = result.stop_reason.as_ref().and_then(StopReason::finish_reason)
        {
            events.push(Ok(StreamEvent::Done {
                finish_reason,
                usage,
            }));
        }
    }

    events
}
