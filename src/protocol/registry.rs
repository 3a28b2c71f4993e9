//! Message type registry
//!
//! Maps each type code to the decoder for its body. The table is built once
//! and never mutated. Kinds this side only ever sends are registered with an
//! [`DecodeSlot::OutboundOnly`] slot, so asking to decode one is rejected at
//! lookup time.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::message::{self, Header, Message, MessageType};
use super::{CodecError, CodecResult};

/// Decodes a frame body (header already stripped) into a message
pub type DecodeFn = fn(&mut &[u8]) -> CodecResult<Message>;

/// What the registry knows about decoding one message kind
#[derive(Clone, Copy)]
pub enum DecodeSlot {
    /// Frames of this kind can be parsed from the wire
    Inbound(DecodeFn),
    /// This side only sends frames of this kind
    OutboundOnly,
}

/// One registered message kind
#[derive(Clone, Copy)]
pub struct RegistryEntry {
    pub message_type: MessageType,
    pub slot: DecodeSlot,
}

impl RegistryEntry {
    pub fn is_outbound_only(&self) -> bool {
        matches!(self.slot, DecodeSlot::OutboundOnly)
    }
}

/// Immutable type-code to decoder mapping
pub struct Registry {
    entries: HashMap<u8, RegistryEntry>,
}

impl Registry {
    /// Build the registry for the full set of message kinds
    pub fn new() -> Self {
        let entries = MessageType::ALL
            .into_iter()
            .map(|message_type| {
                let entry = RegistryEntry {
                    message_type,
                    slot: slot_for(message_type),
                };
                (message_type.code(), entry)
            })
            .collect();
        Self { entries }
    }

    /// The process-wide registry, built on first use
    pub fn global() -> &'static Registry {
        static REGISTRY: OnceLock<Registry> = OnceLock::new();
        REGISTRY.get_or_init(Registry::new)
    }

    pub fn lookup(&self, code: u8) -> Option<&RegistryEntry> {
        self.entries.get(&code)
    }

    /// Entries ordered by type code
    pub fn entries(&self) -> Vec<&RegistryEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by_key(|e| e.message_type.code());
        entries
    }

    /// Decode a frame body described by `header`.
    ///
    /// `body` must hold exactly `header.body_len()` bytes.
    pub fn decode(&self, header: &Header, body: &[u8]) -> CodecResult<Message> {
        if (header.length as usize) < Header::SIZE {
            return Err(CodecError::malformed(
                "header",
                format!("frame length {} is shorter than the header", header.length),
            ));
        }

        let entry = self
            .lookup(header.message_type)
            .ok_or(CodecError::UnknownMessageType(header.message_type))?;

        let decode = match entry.slot {
            DecodeSlot::Inbound(decode) => decode,
            DecodeSlot::OutboundOnly => {
                return Err(CodecError::UnsupportedOperation(entry.message_type))
            }
        };

        if body.len() != header.body_len() {
            return Err(CodecError::Truncated {
                what: "message body",
                needed: header.body_len(),
                remaining: body.len(),
            });
        }

        let mut cursor = body;
        let message = decode(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(CodecError::malformed(
                "message body",
                format!("{} trailing bytes after {}", cursor.len(), entry.message_type),
            ));
        }
        Ok(message)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn slot_for(message_type: MessageType) -> DecodeSlot {
    match message_type {
        MessageType::MoveModule => DecodeSlot::Inbound(message::decode_move_module),
        MessageType::NodesAdd => DecodeSlot::Inbound(message::decode_nodes_add),
        MessageType::NodesDel => DecodeSlot::Inbound(message::decode_nodes_del),
        MessageType::ModulesAdd => DecodeSlot::Inbound(message::decode_modules_add),
        MessageType::ModulesDel => DecodeSlot::Inbound(message::decode_modules_del),
        MessageType::ModuleStatusRequest => {
            DecodeSlot::Inbound(message::decode_module_status_request)
        }
        MessageType::ReadStateValues => DecodeSlot::Inbound(message::decode_read_state_values),
        MessageType::SetStateValues => DecodeSlot::Inbound(message::decode_set_state_values),
        MessageType::TestInfo
        | MessageType::ModuleStatusReply
        | MessageType::ModuleStatusChange
        | MessageType::ModuleAlert => DecodeSlot::OutboundOnly,
    }
}
