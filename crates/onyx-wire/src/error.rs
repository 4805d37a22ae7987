use thiserror::Error;

/// Top-level error type for the `onyx-wire` crate.
///
/// Covers every failure mode of the wire layer: session establishment,
/// mid-session transport loss, framing, and outbound encoding.
/// `onyx-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum WireError {
    /// Session could not be established (refused, unreachable, timed out).
    #[error("Cannot connect to console at {host}:{port}: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    /// The transport dropped mid-session. Every caller still waiting on a
    /// response receives this same error.
    #[error("Connection to console lost")]
    ConnectionLost,

    /// A response line could not be parsed as part of any frame.
    ///
    /// The decoder resynchronizes at the next recognizable status line;
    /// only the exchange that expected this response fails.
    #[error("Malformed protocol line: {line:?}")]
    Protocol { line: String },

    /// An outbound command contained the line terminator sequence, which
    /// would desynchronize framing. Rejected before any I/O.
    #[error("Command contains a line terminator: {command:?}")]
    Encoding { command: String },

    /// Raw socket error on the established stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Returns `true` if the session is gone and a reconnect is required.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionLost | Self::Io(_))
    }
}
