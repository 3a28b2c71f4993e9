//! Protocol module - Defines the OpenPipes wire protocol
//!
//! Every frame starts with a 7-byte header, big-endian like everything else:
//! - 2 bytes total frame length (header included)
//! - 1 byte message type (0xF0-0xFB)
//! - 4 bytes transaction id
//!
//! Bodies are built from node ids, padded and length-prefixed strings, and
//! the recursive state field / state value trees.

mod codec;
mod error;
mod message;
mod module;
mod node;
mod registry;
mod state_field;
mod state_value;
pub mod wire;

pub use codec::*;
pub use error::*;
pub use message::{Header, Message, MessageType, ModuleStatus};
pub use module::*;
pub use node::*;
pub use registry::*;
pub use state_field::*;
pub use state_value::*;

/// Default port the backend listens on for GUI connections
pub const DEFAULT_PORT: u16 = 2503;
