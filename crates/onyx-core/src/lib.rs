// onyx-core: Live cue-list model and adaptive polling over onyx-wire.

pub mod client;
pub mod config;
pub mod error;
pub mod model;

mod poller;
mod store;
mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{OnyxClient, UpdateCallback};
pub use config::ClientConfig;
pub use error::CoreError;
pub use model::CueList;

// Wire types surfaced through callbacks and return values.
pub use onyx_wire::{MessageKind, OnyxMessage, WireError};
