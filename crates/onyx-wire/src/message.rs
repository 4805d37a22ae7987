//! Parsed response frames.
//!
//! The console speaks a line-oriented protocol with two response shapes.
//! "Info" responses are a run of `CODE-text` lines closed by a bare
//! `CODE [echo]` line:
//!
//! ```text
//! 200-*************Welcome to Onyx Manager v4.0.1010 build 0!*************
//! 200-Type HELP for a list of available commands
//! 200
//! ```
//!
//! "Data" responses are a `CODE [summary]` header followed by raw payload
//! lines up to a lone `.` terminator:
//!
//! ```text
//! 200 Ok
//! 00002 - House Lights
//! 00003 - SlimPar
//! .
//! ```

/// Response shape discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Multi-line human-readable response (`CODE-text` continuation lines).
    Info,
    /// Record-per-line payload response terminated by a `.` line.
    Data,
}

/// One complete decoded response frame.
///
/// Immutable once produced by the codec. `data` holds one entry per payload
/// line for data frames, and the individual text lines for info frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnyxMessage {
    pub kind: MessageKind,
    /// Protocol status code from the status line (e.g. 200, 400).
    pub code: u16,
    /// Human-readable summary. For info frames this is every text line
    /// joined with `\n`; for data frames it is the header line's remainder.
    pub message: String,
    pub data: Vec<String>,
}

impl OnyxMessage {
    /// Returns `true` for a 2xx status code.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// First payload line, if any.
    pub fn first_data(&self) -> Option<&str> {
        self.data.first().map(String::as_str)
    }
}
