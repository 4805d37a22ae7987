// onyx-wire: Wire layer for the Obsidian Onyx console telnet interface.

pub mod codec;
pub mod commands;
pub mod error;
pub mod message;
pub mod session;

pub use codec::{Frame, OnyxCodec};
pub use error::WireError;
pub use message::{MessageKind, OnyxMessage};
pub use session::{MessageCallback, Session};
