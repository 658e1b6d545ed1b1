use bytes::BytesMut;
use faststr::FastStr;
use serde_json::Value;
use std::fmt::Display;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Normalized event produced by the relay. A stream ends with exactly one
/// terminal event (`Done` or `Error`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta { id: Option<FastStr>, text: FastStr },
    Done { final_id: Option<FastStr> },
    Error { message: FastStr },
}

impl StreamEvent {
    pub fn delta(id: Option<FastStr>, text: impl Into<FastStr>) -> Self {
        Self::Delta {
            id,
            text: text.into(),
        }
    }

    pub fn error(message: impl Into<FastStr>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta { .. })
    }
}

impl Display for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delta { text, .. } => write!(f, "{text}"),
            Self::Done { .. } => write!(f, "Done"),
            Self::Error { message } => write!(f, "Error: {message}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// No partial line pending.
    Idle,
    /// Holding the head of a line whose newline has not arrived yet.
    BufferingLine,
    Terminal(Terminal),
}

/// Incremental parser for an OpenAI style event stream.
///
/// Bytes are fed in whatever pieces the network delivers; only complete
/// lines are interpreted, so frames split across chunks (including a split
/// `[DONE]`) are handled. Once a terminal event is produced every further
/// input is ignored.
#[derive(Debug)]
pub struct FrameParser {
    buf:     BytesMut,
    /// Leading bytes of `buf` already searched for a newline.
    scanned: usize,
    state:   ParserState,
    last_id: Option<FastStr>,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buf:     BytesMut::new(),
            scanned: 0,
            state:   ParserState::Idle,
            last_id: None,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ParserState::Terminal(_))
    }

    /// Id of the most recent upstream frame that carried one.
    pub fn last_id(&self) -> Option<&FastStr> {
        self.last_id.as_ref()
    }

    /// Appends a network chunk and returns the events of every line it
    /// completed, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.is_terminal() {
            return events;
        }

        self.buf.extend_from_slice(chunk);
        while let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            self.scanned = 0;
            let line = self.buf.split_to(pos + 1);
            if let Some(event) = self.parse_line(&line[..pos]) {
                events.push(event);
                if self.is_terminal() {
                    self.buf.clear();
                    return events;
                }
            }
        }

        self.scanned = self.buf.len();
        self.state = if self.buf.is_empty() {
            ParserState::Idle
        } else {
            ParserState::BufferingLine
        };
        events
    }

    /// Called when the upstream closed. A final line without a trailing
    /// newline is still interpreted; a stream that never reached a terminal
    /// frame ends with a synthesized `Error`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.is_terminal() {
            return events;
        }

        self.scanned = 0;
        if !self.buf.is_empty() {
            let line = self.buf.split();
            if let Some(event) = self.parse_line(&line) {
                events.push(event);
            }
        }
        if !self.is_terminal() {
            events.extend(self.abort("upstream closed the stream before [DONE]"));
        }
        events
    }

    /// Forces a terminal `Error`, unless the stream already terminated.
    pub fn abort(&mut self, message: impl Into<FastStr>) -> Option<StreamEvent> {
        if self.is_terminal() {
            return None;
        }
        self.buf.clear();
        self.scanned = 0;
        self.state = ParserState::Terminal(Terminal::Error);
        Some(StreamEvent::error(message))
    }

    fn parse_line(&mut self, line: &[u8]) -> Option<StreamEvent> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "skipping upstream line with invalid utf-8");
                return None;
            }
        };

        // comments, `event:` fields and blank keep-alive lines
        let payload = line.strip_prefix(DATA_PREFIX)?.trim();

        if payload == DONE_SENTINEL {
            debug!("upstream sent [DONE]");
            self.state = ParserState::Terminal(Terminal::Done);
            return Some(StreamEvent::Done {
                final_id: self.last_id.clone(),
            });
        }

        if payload.is_empty() {
            return Some(StreamEvent::delta(self.last_id.clone(), ""));
        }

        let data: Value = match serde_json::from_str(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, frame = %payload, "skipping malformed upstream frame");
                return None;
            }
        };

        if let Some(error) = data.get("error").filter(|e| e.is_object()) {
            let message = error["message"].as_str().unwrap_or("upstream reported an error");
            warn!(message = %message, "upstream sent an error frame");
            self.state = ParserState::Terminal(Terminal::Error);
            return Some(StreamEvent::error(message.to_owned()));
        }

        if let Some(id) = data["id"].as_str().filter(|id| !id.is_empty()) {
            self.last_id = Some(FastStr::new(id));
        }

        data["choices"][0]["delta"]["content"]
            .as_str()
            .map(|text| StreamEvent::delta(self.last_id.clone(), text.to_owned()))
    }
}
