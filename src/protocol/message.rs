//! Protocol message definitions
//!
//! Defines the twelve message kinds exchanged between the GUI and the
//! module management backend, the frame header they share, and the body
//! decoders the registry dispatches to.

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use super::module::{Module, NodeInfo};
use super::state_field::FIELD_NAME_LEN;
use super::state_value::StateValue;
use super::wire::{terminated_len, Wire, WireRead, WireWrite};
use super::{CodecError, CodecResult, NodeId};

/// Message type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    MoveModule = 0xF0,
    TestInfo = 0xF1,
    NodesAdd = 0xF2,
    NodesDel = 0xF3,
    ModulesAdd = 0xF4,
    ModulesDel = 0xF5,
    ModuleStatusRequest = 0xF6,
    ModuleStatusReply = 0xF7,
    ReadStateValues = 0xF8,
    SetStateValues = 0xF9,
    ModuleStatusChange = 0xFA,
    ModuleAlert = 0xFB,
}

impl MessageType {
    pub const ALL: [MessageType; 12] = [
        MessageType::MoveModule,
        MessageType::TestInfo,
        MessageType::NodesAdd,
        MessageType::NodesDel,
        MessageType::ModulesAdd,
        MessageType::ModulesDel,
        MessageType::ModuleStatusRequest,
        MessageType::ModuleStatusReply,
        MessageType::ReadStateValues,
        MessageType::SetStateValues,
        MessageType::ModuleStatusChange,
        MessageType::ModuleAlert,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::MoveModule => "MOVE_MODULE",
            MessageType::TestInfo => "TEST_INFO",
            MessageType::NodesAdd => "NODES_ADD",
            MessageType::NodesDel => "NODES_DEL",
            MessageType::ModulesAdd => "MODULES_ADD",
            MessageType::ModulesDel => "MODULES_DEL",
            MessageType::ModuleStatusRequest => "MODULE_STATUS_REQUEST",
            MessageType::ModuleStatusReply => "MODULE_STATUS_REPLY",
            MessageType::ReadStateValues => "READ_STATE_VALUES",
            MessageType::SetStateValues => "SET_STATE_VALUES",
            MessageType::ModuleStatusChange => "MODULE_STATUS_CHANGE",
            MessageType::ModuleAlert => "MODULE_ALERT",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Frame header: length(2) + type(1) + xid(4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total frame length, header included
    pub length: u16,
    pub message_type: u8,
    /// Correlation id chosen by the sender
    pub xid: u32,
}

impl Header {
    pub const SIZE: usize = 7;

    pub fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(Self::SIZE)
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.length);
        buf.put_u8(self.message_type);
        buf.put_u32(self.xid);
    }

    pub fn decode<B: Buf>(buf: &mut B) -> CodecResult<Self> {
        buf.ensure(Self::SIZE, "header")?;
        let length = buf.get_u16();
        let message_type = buf.get_u8();
        let xid = buf.get_u32();
        if (length as usize) < Self::SIZE {
            return Err(CodecError::malformed(
                "header",
                format!("frame length {} is shorter than the header", length),
            ));
        }
        Ok(Self {
            length,
            message_type,
            xid,
        })
    }
}

/// Module readiness reported in a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModuleStatus {
    Ready = 1,
    NotReady = 2,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleStatus::Ready => write!(f, "ready"),
            ModuleStatus::NotReady => write!(f, "not ready"),
        }
    }
}

/// All protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Module placement change. `from` is [`NodeId::NONE`] when the module
    /// is being added, `to` is [`NodeId::NONE`] when it is being removed.
    MoveModule {
        module: NodeId,
        from: NodeId,
        to: NodeId,
    },

    /// Diagnostic echo of a test input and its output (one-way)
    TestInfo { input: String, output: String },

    /// Nodes appeared in the topology
    NodesAdd { nodes: Vec<NodeInfo> },

    /// Nodes left the topology
    NodesDel { nodes: Vec<NodeInfo> },

    /// Modules became available
    ModulesAdd { modules: Vec<Module> },

    /// Modules are no longer available
    ModulesDel { modules: Vec<Module> },

    /// Ask for the status of a module on a node
    ModuleStatusRequest { node: NodeId, module: NodeId },

    /// Status of a module on a node (one-way)
    ModuleStatusReply {
        node: NodeId,
        module: NodeId,
        status: String,
    },

    /// Ask for the current values of the named state fields
    ReadStateValues { module: NodeId, names: Vec<String> },

    /// Carry state values of a module
    SetStateValues {
        module: NodeId,
        values: Vec<StateValue>,
    },

    /// Module readiness changed (one-way)
    ModuleStatusChange { module: NodeId, status: ModuleStatus },

    /// Free-form alert raised by a module (one-way)
    ModuleAlert { module: NodeId, message: String },
}

impl Message {
    /// Module being placed on `to`
    pub fn add_module(module: NodeId, to: NodeId) -> Self {
        Message::MoveModule {
            module,
            from: NodeId::NONE,
            to,
        }
    }

    /// Module being taken off `from`
    pub fn remove_module(module: NodeId, from: NodeId) -> Self {
        Message::MoveModule {
            module,
            from,
            to: NodeId::NONE,
        }
    }

    /// Get the message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::MoveModule { .. } => MessageType::MoveModule,
            Message::TestInfo { .. } => MessageType::TestInfo,
            Message::NodesAdd { .. } => MessageType::NodesAdd,
            Message::NodesDel { .. } => MessageType::NodesDel,
            Message::ModulesAdd { .. } => MessageType::ModulesAdd,
            Message::ModulesDel { .. } => MessageType::ModulesDel,
            Message::ModuleStatusRequest { .. } => MessageType::ModuleStatusRequest,
            Message::ModuleStatusReply { .. } => MessageType::ModuleStatusReply,
            Message::ReadStateValues { .. } => MessageType::ReadStateValues,
            Message::SetStateValues { .. } => MessageType::SetStateValues,
            Message::ModuleStatusChange { .. } => MessageType::ModuleStatusChange,
            Message::ModuleAlert { .. } => MessageType::ModuleAlert,
        }
    }

    /// Body length in bytes, header excluded
    pub fn body_len(&self) -> usize {
        match self {
            Message::MoveModule { .. } => 3 * NodeId::SIZE,
            Message::TestInfo { input, output } => terminated_len(input) + terminated_len(output),
            Message::NodesAdd { nodes } | Message::NodesDel { nodes } => nodes.len() * NodeInfo::SIZE,
            Message::ModulesAdd { modules } | Message::ModulesDel { modules } => {
                2 + modules.iter().map(Wire::encoded_len).sum::<usize>()
            }
            Message::ModuleStatusRequest { .. } => 2 * NodeId::SIZE,
            Message::ModuleStatusReply { status, .. } => 2 * NodeId::SIZE + terminated_len(status),
            Message::ReadStateValues { names, .. } => NodeId::SIZE + names.len() * FIELD_NAME_LEN,
            Message::SetStateValues { values, .. } => {
                NodeId::SIZE + 2 + values.iter().map(Wire::encoded_len).sum::<usize>()
            }
            Message::ModuleStatusChange { .. } => NodeId::SIZE + 1,
            Message::ModuleAlert { message, .. } => NodeId::SIZE + terminated_len(message),
        }
    }

    /// Total frame length, header included
    pub fn frame_len(&self) -> usize {
        Header::SIZE + self.body_len()
    }

    /// Append the body to `buf`
    pub fn encode_body<B: BufMut>(&self, buf: &mut B) {
        match self {
            Message::MoveModule { module, from, to } => {
                module.encode(buf);
                from.encode(buf);
                to.encode(buf);
            }
            Message::TestInfo { input, output } => {
                buf.write_terminated_str(input);
                buf.write_terminated_str(output);
            }
            Message::NodesAdd { nodes } | Message::NodesDel { nodes } => {
                for node in nodes {
                    node.encode(buf);
                }
            }
            Message::ModulesAdd { modules } | Message::ModulesDel { modules } => {
                buf.write_count(modules.len());
                for module in modules {
                    module.encode(buf);
                }
            }
            Message::ModuleStatusRequest { node, module } => {
                node.encode(buf);
                module.encode(buf);
            }
            Message::ModuleStatusReply {
                node,
                module,
                status,
            } => {
                node.encode(buf);
                module.encode(buf);
                buf.write_terminated_str(status);
            }
            Message::ReadStateValues { module, names } => {
                module.encode(buf);
                for name in names {
                    buf.write_fixed_str(name, FIELD_NAME_LEN);
                }
            }
            Message::SetStateValues { module, values } => {
                module.encode(buf);
                buf.write_count(values.len());
                for value in values {
                    value.encode(buf);
                }
            }
            Message::ModuleStatusChange { module, status } => {
                module.encode(buf);
                buf.put_u8(*status as u8);
            }
            Message::ModuleAlert { module, message } => {
                module.encode(buf);
                buf.write_terminated_str(message);
            }
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.message_type())?;
        match self {
            Message::MoveModule { module, from, to } => {
                if from.is_none() {
                    write!(f, "add {} to {}", module, to)
                } else if to.is_none() {
                    write!(f, "remove {} from {}", module, from)
                } else {
                    write!(f, "move {} from {} to {}", module, from, to)
                }
            }
            Message::TestInfo { input, output } => write!(f, "{} ==> {}", input, output),
            Message::NodesAdd { nodes } | Message::NodesDel { nodes } => {
                write!(f, "nodes=[")?;
                write_list(f, nodes)?;
                write!(f, "]")
            }
            Message::ModulesAdd { modules } | Message::ModulesDel { modules } => {
                write!(f, "modules=[")?;
                write_list(f, modules)?;
                write!(f, "]")
            }
            Message::ModuleStatusRequest { node, module } => {
                write!(f, "request status for module {} on {}", module, node)
            }
            Message::ModuleStatusReply {
                node,
                module,
                status,
            } => write!(f, "status for module {} on {}: {}", module, node, status),
            Message::ReadStateValues { module, names } => {
                write!(f, "module={} values=[{}]", module, names.join(", "))
            }
            Message::SetStateValues { module, values } => {
                write!(f, "module={} values=[", module)?;
                write_list(f, values)?;
                write!(f, "]")
            }
            Message::ModuleStatusChange { module, status } => {
                write!(f, "status for module {}: {}", module, status)
            }
            Message::ModuleAlert { module, message } => {
                write!(f, "module: {} alert: '{}'", module, message)
            }
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

// Body decoders. Each receives exactly the frame body and must consume all of it.

pub(super) fn decode_move_module(body: &mut &[u8]) -> CodecResult<Message> {
    Ok(Message::MoveModule {
        module: NodeId::decode(body)?,
        from: NodeId::decode(body)?,
        to: NodeId::decode(body)?,
    })
}

pub(super) fn decode_nodes_add(body: &mut &[u8]) -> CodecResult<Message> {
    Ok(Message::NodesAdd {
        nodes: decode_node_list(body)?,
    })
}

pub(super) fn decode_nodes_del(body: &mut &[u8]) -> CodecResult<Message> {
    Ok(Message::NodesDel {
        nodes: decode_node_list(body)?,
    })
}

pub(super) fn decode_modules_add(body: &mut &[u8]) -> CodecResult<Message> {
    Ok(Message::ModulesAdd {
        modules: decode_module_list(body)?,
    })
}

pub(super) fn decode_modules_del(body: &mut &[u8]) -> CodecResult<Message> {
    Ok(Message::ModulesDel {
        modules: decode_module_list(body)?,
    })
}

pub(super) fn decode_module_status_request(body: &mut &[u8]) -> CodecResult<Message> {
    Ok(Message::ModuleStatusRequest {
        node: NodeId::decode(body)?,
        module: NodeId::decode(body)?,
    })
}

pub(super) fn decode_read_state_values(body: &mut &[u8]) -> CodecResult<Message> {
    let module = NodeId::decode(body)?;
    let count = exact_count(body.remaining(), FIELD_NAME_LEN, "state field names")?;
    let names = (0..count)
        .map(|_| body.read_fixed_str(FIELD_NAME_LEN, "state field name"))
        .collect::<CodecResult<Vec<_>>>()?;
    Ok(Message::ReadStateValues { module, names })
}

pub(super) fn decode_set_state_values(body: &mut &[u8]) -> CodecResult<Message> {
    let module = NodeId::decode(body)?;
    let count = body.read_u16("state value count")?;
    let values = (0..count)
        .map(|_| StateValue::decode(body))
        .collect::<CodecResult<Vec<_>>>()?;
    Ok(Message::SetStateValues { module, values })
}

/// Node lists carry no count: the body is a whole number of fixed-size entries
fn decode_node_list(body: &mut &[u8]) -> CodecResult<Vec<NodeInfo>> {
    let count = exact_count(body.remaining(), NodeInfo::SIZE, "node list")?;
    (0..count).map(|_| NodeInfo::decode(body)).collect()
}

fn decode_module_list(body: &mut &[u8]) -> CodecResult<Vec<Module>> {
    let count = body.read_u16("module count")?;
    (0..count).map(|_| Module::decode(body)).collect()
}

fn exact_count(remaining: usize, size: usize, what: &'static str) -> CodecResult<usize> {
    if remaining % size != 0 {
        return Err(CodecError::malformed(
            what,
            format!("{} bytes is not a multiple of the {}-byte entry size", remaining, size),
        ));
    }
    Ok(remaining / size)
}
