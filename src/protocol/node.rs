//! Node and module identifiers
//!
//! A node on the wire is a 2-byte kind followed by an 8-byte id. Module
//! nodes pack two 32-bit halves into that id: the copy id in the upper half
//! and the module id in the lower half, so several deployed copies of the
//! same module logic can be told apart.

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use super::wire::{Wire, WireRead};
use super::{CodecError, CodecResult};

/// Kind of node in the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum NodeKind {
    Unknown = 0x0000,
    Input = 0x0010,
    Output = 0x0011,
    ExternalComputer = 0x0012,
    HardwareSwitch = 0x0013,
    HardwareModule = 0x0020,
    SoftwareModule = 0x0021,
}

impl NodeKind {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0000 => Some(NodeKind::Unknown),
            0x0010 => Some(NodeKind::Input),
            0x0011 => Some(NodeKind::Output),
            0x0012 => Some(NodeKind::ExternalComputer),
            0x0013 => Some(NodeKind::HardwareSwitch),
            0x0020 => Some(NodeKind::HardwareModule),
            0x0021 => Some(NodeKind::SoftwareModule),
            _ => None,
        }
    }

    /// Whether ids of this kind are composite module ids
    pub fn is_module(self) -> bool {
        matches!(self, NodeKind::HardwareModule | NodeKind::SoftwareModule)
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Unknown => "unknown",
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::ExternalComputer => "pc",
            NodeKind::HardwareSwitch => "switch",
            NodeKind::HardwareModule => "hw-module",
            NodeKind::SoftwareModule => "sw-module",
        }
    }
}

/// A node reference: kind plus opaque 64-bit id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub kind: NodeKind,
    pub id: u64,
}

impl NodeId {
    pub const SIZE: usize = 10;

    /// Stands in for the missing end of a move: no source when a module is
    /// added, no destination when it is removed
    pub const NONE: NodeId = NodeId {
        kind: NodeKind::Unknown,
        id: 0x0000_0000_FFFF_FFFF,
    };

    pub fn new(kind: NodeKind, id: u64) -> Self {
        Self { kind, id }
    }

    /// Build a module node from its module and copy ids
    pub fn module(kind: NodeKind, module_id: u64, copy_id: u32) -> CodecResult<Self> {
        Ok(Self::new(kind, make_module_id(module_id, copy_id)?))
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Split the id into `(module_id, copy_id)`
    pub fn module_parts(&self) -> (u32, u32) {
        split_module_id(self.id)
    }
}

impl Wire for NodeId {
    fn encoded_len(&self) -> usize {
        Self::SIZE
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.kind.code());
        buf.put_u64(self.id);
    }

    fn decode<B: Buf>(buf: &mut B) -> CodecResult<Self> {
        buf.ensure(Self::SIZE, "node id")?;
        let code = buf.get_u16();
        let kind = NodeKind::from_code(code)
            .ok_or_else(|| CodecError::malformed("node id", format!("unknown node kind {:#06x}", code)))?;
        Ok(Self::new(kind, buf.get_u64()))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        if self.kind.is_module() {
            let (module_id, copy_id) = self.module_parts();
            write!(f, "{}:{}.{}", self.kind.name(), module_id, copy_id)
        } else {
            write!(f, "{}:{:#x}", self.kind.name(), self.id)
        }
    }
}

/// Pack a module id and copy id into a composite node id.
///
/// Fails if `module_id` does not fit in 32 bits.
pub fn make_module_id(module_id: u64, copy_id: u32) -> CodecResult<u64> {
    if module_id & 0xFFFF_FFFF_0000_0000 != 0 {
        return Err(CodecError::InvalidArgument(format!(
            "upper 32 bits of a module id must be zero, got {:#018x}",
            module_id
        )));
    }
    Ok(((copy_id as u64) << 32) | module_id)
}

/// Split a composite node id into `(module_id, copy_id)`
pub fn split_module_id(id: u64) -> (u32, u32) {
    ((id & 0xFFFF_FFFF) as u32, (id >> 32) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_layout() {
        let node = NodeId::new(NodeKind::HardwareSwitch, 0x0102_0304_0506_0708);
        let bytes = node.to_bytes();
        assert_eq!(
            &bytes[..],
            &[0x00, 0x13, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );

        let (decoded, consumed) = NodeId::decode_prefix(&bytes).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(consumed, NodeId::SIZE);
    }

    #[test]
    fn test_node_id_truncated() {
        let bytes = NodeId::new(NodeKind::Input, 111).to_bytes();
        for len in 0..NodeId::SIZE {
            let err = NodeId::decode_prefix(&bytes[..len]).unwrap_err();
            assert!(err.is_format_error(), "len {}: {:?}", len, err);
        }
    }

    #[test]
    fn test_unknown_node_kind() {
        let bytes = [0x77, 0x77, 0, 0, 0, 0, 0, 0, 0, 1];
        assert!(NodeId::decode_prefix(&bytes).unwrap_err().is_format_error());
    }

    #[test]
    fn test_module_id_roundtrip() {
        let samples = [
            (0u64, 0u32),
            (4, 1),
            (0xFFFF_FFFF, 0xFFFF_FFFF),
            (0x1234_5678, 0x9ABC_DEF0),
            (1, u32::MAX),
        ];
        for (module_id, copy_id) in samples {
            let id = make_module_id(module_id, copy_id).unwrap();
            assert_eq!(split_module_id(id), (module_id as u32, copy_id));
        }
        assert_eq!(make_module_id(4, 1).unwrap(), 0x0000_0001_0000_0004);
    }

    #[test]
    fn test_module_id_rejects_wide_module() {
        for module_id in [1u64 << 32, 0xFFFF_FFFF_0000_0000, u64::MAX] {
            assert!(matches!(
                make_module_id(module_id, 0),
                Err(CodecError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_display() {
        let module = NodeId::module(NodeKind::HardwareModule, 4, 1).unwrap();
        assert_eq!(module.to_string(), "hw-module:4.1");
        assert_eq!(NodeId::NONE.to_string(), "none");
        assert_eq!(NodeId::new(NodeKind::Input, 111).to_string(), "input:0x6f");
    }
}
