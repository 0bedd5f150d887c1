//! Outbound event-stream framing
//!
//! One frame is an `event:` line, one `data:` line per payload line, and a
//! blank-line terminator. The encoder and the incremental decoder live
//! together so producer and consumer can never drift apart.

use std::fmt;
use std::str::FromStr;

/// Kind of an outbound event
///
/// Lifecycle per request: exactly one `Open` first, zero or more
/// `Info`/`Token` in emission order, then a single terminal `Done` or
/// `Error` before the transport closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Open,
    Info,
    Token,
    Error,
    Done,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Info => "info",
            EventKind::Token => "token",
            EventKind::Error => "error",
            EventKind::Done => "done",
        }
    }
}

impl FromStr for EventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(EventKind::Open),
            "info" => Ok(EventKind::Info),
            "token" => Ok(EventKind::Token),
            "error" => Ok(EventKind::Error),
            "done" => Ok(EventKind::Done),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single event owned by the gateway for the duration of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub kind: EventKind,
    pub payload: String,
}

impl OutboundEvent {
    pub fn new(kind: EventKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

/// Serialize one event as a wire frame.
///
/// Carriage returns in the payload are normalized to LF, and each payload
/// line gets its own `data:` line so newlines survive the round trip.
pub fn encode_event(event: &OutboundEvent) -> String {
    let normalized = event.payload.replace("\r\n", "\n").replace('\r', "\n");

    let mut frame = format!("event: {}\n", event.kind);
    for line in normalized.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

/// Incremental frame decoder for the consumer side.
///
/// Chunk boundaries are arbitrary; any trailing partial frame is buffered
/// until the next push.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of raw stream text, returning every complete frame it
    /// finished. Frames with no recognized kind are discarded.
    pub fn push(&mut self, chunk: &str) -> Vec<OutboundEvent> {
        self.buffer.push_str(chunk);

        let mut events = Vec::new();
        while let Some(idx) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..idx + 2).collect();
            if let Some(event) = parse_frame(frame.trim_end_matches('\n')) {
                events.push(event);
            }
        }
        events
    }
}

/// Parse one frame body (without its blank-line terminator).
///
/// The last `event:` line wins if duplicated; `data:` lines are joined with
/// `\n`, with exactly one leading space after the colon stripped per line.
fn parse_frame(frame: &str) -> Option<OutboundEvent> {
    let mut kind: Option<EventKind> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.split('\n') {
        if let Some(rest) = line.strip_prefix("event:") {
            let value = rest.strip_prefix(' ').unwrap_or(rest);
            kind = value.parse().ok();
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    kind.map(|kind| OutboundEvent::new(kind, data_lines.join("\n")))
}
