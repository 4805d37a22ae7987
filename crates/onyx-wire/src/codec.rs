//! Frame codec for the console's line protocol.
//!
//! [`OnyxCodec`] implements [`Decoder`] and [`Encoder`] for use with
//! `tokio_util::codec::Framed`. Decoding is a small state machine over
//! CRLF-terminated lines (the console runs on Windows; lone LF is
//! tolerated). Partial frames stay buffered until more bytes arrive.
//!
//! A line that cannot begin or continue a frame is surfaced as
//! [`Frame::Invalid`] rather than as a stream error, so the decode loop
//! survives garbage and resynchronizes at the next recognizable status
//! line. The session layer decides which exchange (if any) that kills.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::WireError;
use crate::message::{MessageKind, OnyxMessage};

/// Line terminator the console expects on outbound commands.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Sentinel closing a data frame's payload.
const DATA_TERMINATOR: &str = ".";

/// Cap on a single unterminated line before the buffer is discarded.
const MAX_LINE_LEN: usize = 16 * 1024;

/// One decoder output: either a complete frame or a line the decoder
/// could not attribute to any frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(OnyxMessage),
    /// Unparseable line. The frame it interrupted (if any) is discarded.
    Invalid(String),
}

/// How a status line was punctuated.
enum StatusLine<'a> {
    /// `DDD-text` — info continuation line.
    Continuation(u16, &'a str),
    /// `DDD` or `DDD text` — data header, or the close of an info frame.
    Header(u16, &'a str),
}

/// Split a status line into code and remainder, or `None` if the line
/// does not start with three digits followed by `-`, space, or EOL.
fn parse_status(line: &str) -> Option<StatusLine<'_>> {
    let (digits, rest) = line.split_at_checked(3)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code: u16 = digits.parse().ok()?;
    match rest.as_bytes().first() {
        None => Some(StatusLine::Header(code, "")),
        Some(b'-') => Some(StatusLine::Continuation(code, &rest[1..])),
        Some(b' ') => Some(StatusLine::Header(code, &rest[1..])),
        Some(_) => None,
    }
}

enum DecodeState {
    Idle,
    /// Accumulating `DDD-text` lines of an info frame.
    Info { code: u16, lines: Vec<String> },
    /// Accumulating payload lines of a data frame.
    Data {
        code: u16,
        message: String,
        lines: Vec<String>,
    },
}

/// Codec turning the raw byte stream into [`Frame`]s and commands into
/// terminated lines.
pub struct OnyxCodec {
    state: DecodeState,
}

impl OnyxCodec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
        }
    }

    /// Feed one line to the state machine. Returns a frame when one
    /// completes.
    fn feed_line(&mut self, line: &str) -> Option<Frame> {
        match &mut self.state {
            DecodeState::Idle => match parse_status(line) {
                Some(StatusLine::Continuation(code, text)) => {
                    self.state = DecodeState::Info {
                        code,
                        lines: vec![text.to_owned()],
                    };
                    None
                }
                Some(StatusLine::Header(code, text)) => {
                    self.state = DecodeState::Data {
                        code,
                        message: text.to_owned(),
                        lines: Vec::new(),
                    };
                    None
                }
                None if line.is_empty() => None,
                None => Some(Frame::Invalid(line.to_owned())),
            },

            DecodeState::Info { code, lines } => match parse_status(line) {
                Some(StatusLine::Continuation(_, text)) => {
                    lines.push(text.to_owned());
                    None
                }
                // Bare `DDD [echo]` closes the info frame. The echo of the
                // command that triggered it carries no information.
                Some(StatusLine::Header(..)) => {
                    let code = *code;
                    let lines = std::mem::take(lines);
                    self.state = DecodeState::Idle;
                    Some(Frame::Message(OnyxMessage {
                        kind: MessageKind::Info,
                        code,
                        message: lines.join("\n"),
                        data: lines,
                    }))
                }
                None if line.is_empty() => None,
                None => {
                    warn!(line, "unparseable line inside info frame, discarding frame");
                    self.state = DecodeState::Idle;
                    Some(Frame::Invalid(line.to_owned()))
                }
            },

            DecodeState::Data {
                code,
                message,
                lines,
            } => {
                if line == DATA_TERMINATOR {
                    let code = *code;
                    let message = std::mem::take(message);
                    let lines = std::mem::take(lines);
                    self.state = DecodeState::Idle;
                    Some(Frame::Message(OnyxMessage {
                        kind: MessageKind::Data,
                        code,
                        message,
                        data: lines,
                    }))
                } else {
                    lines.push(line.to_owned());
                    None
                }
            }
        }
    }
}

impl Default for OnyxCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Pop one complete line off the front of `src`, stripping the trailing
/// CR if the terminator was CRLF.
fn take_line(src: &mut BytesMut) -> Option<String> {
    let nl = src.iter().position(|&b| b == b'\n')?;
    let line = src.split_to(nl + 1);
    let mut end = nl;
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    Some(String::from_utf8_lossy(&line[..end]).into_owned())
}

impl Decoder for OnyxCodec {
    type Item = Frame;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WireError> {
        while let Some(line) = take_line(src) {
            if let Some(frame) = self.feed_line(&line) {
                return Ok(Some(frame));
            }
        }
        if src.len() > MAX_LINE_LEN {
            let garbage = String::from_utf8_lossy(src).into_owned();
            src.clear();
            self.state = DecodeState::Idle;
            return Ok(Some(Frame::Invalid(garbage)));
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WireError> {
        let frame = self.decode(src)?;
        if frame.is_none() && (!src.is_empty() || !matches!(self.state, DecodeState::Idle)) {
            // Stream ended mid-frame. Partial frames are never delivered.
            warn!("stream closed with a partial frame buffered");
            src.clear();
            self.state = DecodeState::Idle;
        }
        Ok(frame)
    }
}

impl Encoder<String> for OnyxCodec {
    type Error = WireError;

    fn encode(&mut self, command: String, dst: &mut BytesMut) -> Result<(), WireError> {
        if command.contains(['\r', '\n']) {
            return Err(WireError::Encoding { command });
        }
        dst.reserve(command.len() + LINE_TERMINATOR.len());
        dst.put_slice(command.as_bytes());
        dst.put_slice(LINE_TERMINATOR.as_bytes());
        Ok(())
    }
}
