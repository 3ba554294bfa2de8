//! Re-frames a raw completion stream into client events.
//!
//! Raw chunks arrive with arbitrary boundaries: a record may be split across reads and a
//! `<think>` marker may be split across records. [`RecordDecoder`] reassembles records,
//! [`ThinkFilter`] hides reasoning spans with state that spans the whole response, and
//! [`reframe`] wraps both into an event stream that always ends with [`ReframedEvent::Done`].

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::Role;
use crate::error::MalformedRecord;
use crate::generator::{RawStream, WireFormat};

/// Opening marker of a reasoning span.
pub const THINK_OPEN: &str = "<think>";
/// Closing marker of a reasoning span.
pub const THINK_CLOSE: &str = "</think>";

/// Payload of a terminal SSE event.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Unit of assistant output sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Session-scoped identifier shared by every event of one response.
    pub id: String,
    /// Always [`Role::Assistant`].
    pub role: Role,
    /// Filtered text increment.
    pub content: String,
}

impl StreamEvent {
    /// Builds an assistant event.
    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Item of a reframed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReframedEvent {
    /// Visible text increment.
    Delta(StreamEvent),
    /// Terminal sentinel; always the last item.
    Done,
}

impl ReframedEvent {
    /// Payload for the SSE `data:` field.
    pub fn sse_data(&self) -> String {
        match self {
            ReframedEvent::Delta(event) => serde_json::to_string(event)
                .unwrap_or_else(|_| String::from("{}")),
            ReframedEvent::Done => DONE_SENTINEL.to_string(),
        }
    }
}

/// Client-facing event stream for one response.
pub type EventStream = BoxStream<'static, ReframedEvent>;

/// Filter position relative to reasoning markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkState {
    /// Text is emitted.
    Outside,
    /// Text is discarded until the closing marker.
    InsideThink,
}

/// Removes `<think>…</think>` spans from text delivered in arbitrary increments.
///
/// A trailing piece that could still grow into the awaited marker is held back until the next
/// increment decides it.
#[derive(Debug)]
pub struct ThinkFilter {
    state: ThinkState,
    held: String,
}

impl Default for ThinkFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkFilter {
    /// Starts `Outside`.
    pub fn new() -> Self {
        Self {
            state: ThinkState::Outside,
            held: String::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ThinkState {
        self.state
    }

    /// Feeds one increment and returns the text that is now known to be visible.
    pub fn push(&mut self, increment: &str) -> String {
        self.held.push_str(increment);
        let mut visible = String::new();
        loop {
            let marker = match self.state {
                ThinkState::Outside => THINK_OPEN,
                ThinkState::InsideThink => THINK_CLOSE,
            };
            if let Some(pos) = self.held.find(marker) {
                if self.state == ThinkState::Outside {
                    visible.push_str(&self.held[..pos]);
                }
                self.held.drain(..pos + marker.len());
                self.state = match self.state {
                    ThinkState::Outside => ThinkState::InsideThink,
                    ThinkState::InsideThink => ThinkState::Outside,
                };
                continue;
            }
            let cut = self.held.len() - partial_marker_len(&self.held, marker);
            if self.state == ThinkState::Outside {
                visible.push_str(&self.held[..cut]);
            }
            self.held.drain(..cut);
            return visible;
        }
    }

    /// Ends the response. Held text is released when `Outside` and dropped when an unterminated
    /// span is still open.
    pub fn finish(&mut self) -> String {
        let held = std::mem::take(&mut self.held);
        match self.state {
            ThinkState::Outside => held,
            ThinkState::InsideThink => String::new(),
        }
    }
}

/// Length of the longest proper prefix of `marker` that `text` ends with.
fn partial_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&len| {
            len <= text.len()
                && text.is_char_boundary(text.len() - len)
                && marker.starts_with(&text[text.len() - len..])
        })
        .unwrap_or(0)
}

/// One decoded backend record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Text increment. `last` marks the backend's final record.
    Text {
        /// Decoded increment, possibly empty.
        text: String,
        /// Set on the final record of the response.
        last: bool,
    },
    /// Explicit end-of-stream marker.
    Done,
    /// The backend reported an error inside the stream.
    Failed(String),
    /// Framing noise such as blank lines or SSE comments.
    Ignore,
}

#[derive(Debug, Deserialize)]
struct OllamaRecord {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

fn ollama_record(value: Value) -> Result<Record, MalformedRecord> {
    let record: OllamaRecord =
        serde_json::from_value(value).map_err(|err| MalformedRecord(err.to_string()))?;
    if let Some(error) = record.error {
        return Ok(Record::Failed(error));
    }
    match record.response {
        Some(text) => Ok(Record::Text {
            text,
            last: record.done,
        }),
        None if record.done => Ok(Record::Text {
            text: String::new(),
            last: true,
        }),
        None => Err(MalformedRecord("record has no `response` field".to_string())),
    }
}

fn sse_record(line: &[u8]) -> Result<Record, MalformedRecord> {
    let line = std::str::from_utf8(line).map_err(|err| MalformedRecord(err.to_string()))?;
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(Record::Ignore);
    }
    let Some(payload) = line.strip_prefix("data:") else {
        if ["event:", "id:", "retry:"]
            .iter()
            .any(|field| line.starts_with(field))
        {
            return Ok(Record::Ignore);
        }
        return Err(MalformedRecord(format!("unexpected SSE line: {line}")));
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Ok(Record::Done);
    }
    let value: Value =
        serde_json::from_str(payload).map_err(|err| MalformedRecord(err.to_string()))?;
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Ok(Record::Failed(message));
    }
    let choices = value
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| MalformedRecord("chunk has no `choices` array".to_string()))?;
    let text = choices
        .first()
        .and_then(|choice| choice.pointer("/delta/content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(Record::Text { text, last: false })
}

/// Reassembles backend records from raw chunks with arbitrary boundaries.
#[derive(Debug)]
pub struct RecordDecoder {
    format: WireFormat,
    buf: Vec<u8>,
}

impl RecordDecoder {
    /// Creates a decoder for the given framing.
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            buf: Vec::new(),
        }
    }

    /// Appends a chunk and decodes every record it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Record, MalformedRecord>> {
        self.buf.extend_from_slice(chunk);
        match self.format {
            WireFormat::OllamaNdjson => self.drain_json_values(),
            WireFormat::OpenAiSse => self.drain_lines(),
        }
    }

    /// Decodes whatever is left once the raw stream has ended.
    pub fn finish(&mut self) -> Vec<Result<Record, MalformedRecord>> {
        let rest = std::mem::take(&mut self.buf);
        if rest.iter().all(u8::is_ascii_whitespace) {
            return Vec::new();
        }
        match self.format {
            WireFormat::OllamaNdjson => match serde_json::from_slice::<Value>(&rest) {
                Ok(value) => vec![ollama_record(value)],
                Err(err) => vec![Err(MalformedRecord(format!("truncated record: {err}")))],
            },
            WireFormat::OpenAiSse => vec![sse_record(&rest)],
        }
    }

    fn drain_lines(&mut self) -> Vec<Result<Record, MalformedRecord>> {
        let mut out = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            out.push(sse_record(&self.buf[start..end]));
            start = end + 1;
        }
        self.buf.drain(..start);
        out
    }

    fn drain_json_values(&mut self) -> Vec<Result<Record, MalformedRecord>> {
        let mut out = Vec::new();
        let mut pos = 0;
        loop {
            while pos < self.buf.len() && self.buf[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos == self.buf.len() {
                break;
            }
            let mut values =
                serde_json::Deserializer::from_slice(&self.buf[pos..]).into_iter::<Value>();
            match values.next() {
                Some(Ok(value)) => {
                    pos += values.byte_offset();
                    out.push(ollama_record(value));
                }
                Some(Err(err)) if err.is_eof() => break,
                Some(Err(err)) => {
                    out.push(Err(MalformedRecord(err.to_string())));
                    pos = self.resync_point(pos + 1);
                }
                None => break,
            }
        }
        self.buf.drain(..pos);
        out
    }

    /// Next plausible record start at or after `from`: a newline or an opening brace.
    fn resync_point(&self, from: usize) -> usize {
        self.buf[from.min(self.buf.len())..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'{')
            .map(|offset| from + offset)
            .unwrap_or(self.buf.len())
    }
}

/// Synchronous core of [`reframe`]: raw chunks in, visible increments out.
#[derive(Debug)]
pub struct Reframer {
    decoder: RecordDecoder,
    filter: ThinkFilter,
    stopped: bool,
    failure: Option<String>,
}

impl Reframer {
    /// Creates a reframer for the given framing.
    pub fn new(format: WireFormat) -> Self {
        Self {
            decoder: RecordDecoder::new(format),
            filter: ThinkFilter::new(),
            stopped: false,
            failure: None,
        }
    }

    /// Whether the backend signalled the end of the response.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Error the backend reported inside the stream, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Feeds one raw chunk; returns the non-empty visible increments it produced.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.stopped {
            return Vec::new();
        }
        let records = self.decoder.push(chunk);
        self.apply(records)
    }

    /// Flushes buffered input and the filter. Call once after the raw stream ends.
    pub fn finish(&mut self) -> Vec<String> {
        let mut visible = if self.stopped {
            Vec::new()
        } else {
            let records = self.decoder.finish();
            self.apply(records)
        };
        let tail = self.filter.finish();
        if !tail.is_empty() {
            visible.push(tail);
        }
        visible
    }

    fn apply(&mut self, records: Vec<Result<Record, MalformedRecord>>) -> Vec<String> {
        let mut visible = Vec::new();
        for record in records {
            match record {
                Ok(Record::Text { text, last }) => {
                    let shown = self.filter.push(&text);
                    if !shown.is_empty() {
                        visible.push(shown);
                    }
                    if last {
                        self.stopped = true;
                        break;
                    }
                }
                Ok(Record::Done) => {
                    self.stopped = true;
                    break;
                }
                Ok(Record::Failed(message)) => {
                    self.failure = Some(message);
                    self.stopped = true;
                    break;
                }
                Ok(Record::Ignore) => {}
                Err(err) => tracing::debug!(error = %err, "skipping stream record"),
            }
        }
        visible
    }
}

/// Turns a raw completion stream into client events sharing `session_id`.
///
/// Events are forwarded as chunks arrive. Transport failures and backend-reported errors end
/// the stream early; [`ReframedEvent::Done`] is emitted in every case. Dropping the returned
/// stream drops `raw`, which releases the upstream connection.
pub fn reframe(mut raw: RawStream, format: WireFormat, session_id: String) -> EventStream {
    let events = async_stream::stream! {
        let mut reframer = Reframer::new(format);
        while let Some(chunk) = raw.next().await {
            match chunk {
                Ok(bytes) => {
                    for content in reframer.push(&bytes) {
                        yield ReframedEvent::Delta(StreamEvent::assistant(session_id.as_str(), content));
                    }
                    if reframer.is_stopped() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(session = %session_id, error = %err, "completion stream failed, closing early");
                    break;
                }
            }
        }
        drop(raw);
        if let Some(message) = reframer.failure() {
            tracing::warn!(session = %session_id, error = %message, "completion backend reported an error");
        }
        for content in reframer.finish() {
            yield ReframedEvent::Delta(StreamEvent::assistant(session_id.as_str(), content));
        }
        tracing::debug!(session = %session_id, "completion stream closed");
        yield ReframedEvent::Done;
    };
    events.boxed()
}
