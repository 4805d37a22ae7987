// ── Runtime connection configuration ──
//
// Describes *how* to reach a console and how aggressively to poll it.
// The core never reads config files; the embedding application builds a
// `ClientConfig` and hands it in.

use std::time::Duration;

/// Configuration for a single console connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Console host name or address.
    pub host: String,
    /// Telnet interface port (the manager defaults to 2323).
    pub port: u16,
    /// Bound on TCP connect and on the greeting wait.
    pub connect_timeout: Duration,
    /// Poll interval while every cue list is in a steady state.
    pub poll_interval: Duration,
    /// Poll interval while any cue list is transitioning.
    pub fast_poll_interval: Duration,
}

impl ClientConfig {
    /// Config for `host` with every other field at its default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 2323,
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            fast_poll_interval: Duration::from_millis(200),
        }
    }
}
