// ── Core error types ──
//
// User-facing errors from onyx-core. Wire-layer failures are translated
// into domain-appropriate variants by the `From<WireError>` impl;
// consumers never see raw I/O errors directly.

use thiserror::Error;

use onyx_wire::WireError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to console at {host}:{port}: {reason}")]
    ConnectionFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Connection to console lost")]
    ConnectionLost,

    #[error("Not connected to a console")]
    Disconnected,

    // ── Protocol errors ──────────────────────────────────────────────
    #[error("Protocol violation: {line:?}")]
    Protocol { line: String },

    #[error("Command rejected by console (code {code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("Unexpected response: {reason}")]
    UnexpectedResponse { reason: String },

    // ── Input validation (rejected before any I/O) ───────────────────
    #[error("Level {level} is outside the valid range 0-255")]
    LevelOutOfRange { level: u16 },

    #[error("Command contains a line terminator: {command:?}")]
    InvalidCommand { command: String },
}

impl CoreError {
    /// Returns `true` if the session is gone and polling must stop
    /// until an explicit reconnect.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionLost | Self::Disconnected)
    }
}

impl From<WireError> for CoreError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Connection { host, port, reason } => {
                Self::ConnectionFailed { host, port, reason }
            }
            WireError::ConnectionLost => Self::ConnectionLost,
            WireError::Protocol { line } => Self::Protocol { line },
            WireError::Encoding { command } => Self::InvalidCommand { command },
            WireError::Io(e) => {
                tracing::debug!(error = %e, "socket error surfaced as connection loss");
                Self::ConnectionLost
            }
        }
    }
}
