//! Topology entities: described nodes, modules and their ports

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use super::state_field::StateField;
use super::wire::{prefixed_len, truncate_utf8, Wire, WireRead, WireWrite};
use super::{CodecResult, NodeId};

/// A node announced to the GUI with a display name and description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: NodeId,
    pub name: String,
    pub desc: String,
}

impl NodeInfo {
    pub const NAME_LEN: usize = 32;
    pub const DESC_LEN: usize = 128;
    pub const SIZE: usize = NodeId::SIZE + Self::NAME_LEN + Self::DESC_LEN;

    pub fn new(node: NodeId, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            node,
            name: name.into(),
            desc: desc.into(),
        }
    }
}

impl Wire for NodeInfo {
    fn encoded_len(&self) -> usize {
        Self::SIZE
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.node.encode(buf);
        buf.write_fixed_str(&self.name, Self::NAME_LEN);
        buf.write_fixed_str(&self.desc, Self::DESC_LEN);
    }

    fn decode<B: Buf>(buf: &mut B) -> CodecResult<Self> {
        let node = NodeId::decode(buf)?;
        let name = buf.read_fixed_str(Self::NAME_LEN, "node name")?;
        let desc = buf.read_fixed_str(Self::DESC_LEN, "node description")?;
        Ok(Self { node, name, desc })
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} name='{}' desc='{}'", self.node, self.name, self.desc)
    }
}

/// A port exposed by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: u16,
    pub name: String,
    pub desc: String,
}

impl Port {
    pub const NAME_LEN_MAX: usize = 32;
    pub const DESC_LEN_MAX: usize = 128;

    /// Create a port, truncating the name and description to their limits
    pub fn new(id: u16, name: &str, desc: &str) -> Self {
        Self {
            id,
            name: truncate_utf8(name, Self::NAME_LEN_MAX).to_string(),
            desc: truncate_utf8(desc, Self::DESC_LEN_MAX).to_string(),
        }
    }

    fn wire_name(&self) -> &str {
        truncate_utf8(&self.name, Self::NAME_LEN_MAX)
    }

    fn wire_desc(&self) -> &str {
        truncate_utf8(&self.desc, Self::DESC_LEN_MAX)
    }
}

impl Wire for Port {
    fn encoded_len(&self) -> usize {
        2 + prefixed_len(self.wire_name()) + prefixed_len(self.wire_desc())
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.id);
        buf.write_prefixed_str(self.wire_name());
        buf.write_prefixed_str(self.wire_desc());
    }

    fn decode<B: Buf>(buf: &mut B) -> CodecResult<Self> {
        let id = buf.read_u16("port id")?;
        let name = buf.read_prefixed_str("port name")?;
        let desc = buf.read_prefixed_str("port description")?;
        Ok(Self { id, name, desc })
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {} '{}' ({})", self.id, self.name, self.desc)
    }
}

/// A deployable module together with its ports and configurable state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub node: NodeId,
    pub name: String,
    pub ports: Vec<Port>,
    pub fields: Vec<StateField>,
}

impl Module {
    pub const NAME_LEN: usize = 32;

    pub fn new(node: NodeId, name: impl Into<String>) -> Self {
        Self {
            node,
            name: name.into(),
            ports: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_ports(mut self, ports: Vec<Port>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_fields(mut self, fields: Vec<StateField>) -> Self {
        self.fields = fields;
        self
    }
}

impl Wire for Module {
    fn encoded_len(&self) -> usize {
        NodeId::SIZE
            + Self::NAME_LEN
            + 2
            + self.ports.iter().map(Wire::encoded_len).sum::<usize>()
            + 2
            + self.fields.iter().map(Wire::encoded_len).sum::<usize>()
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.node.encode(buf);
        buf.write_fixed_str(&self.name, Self::NAME_LEN);
        buf.write_count(self.ports.len());
        for port in &self.ports {
            port.encode(buf);
        }
        buf.write_count(self.fields.len());
        for field in &self.fields {
            field.encode(buf);
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> CodecResult<Self> {
        let node = NodeId::decode(buf)?;
        let name = buf.read_fixed_str(Self::NAME_LEN, "module name")?;

        let num_ports = buf.read_u16("port count")?;
        let ports = (0..num_ports)
            .map(|_| Port::decode(buf))
            .collect::<CodecResult<Vec<_>>>()?;

        let num_fields = buf.read_u16("state field count")?;
        let fields = (0..num_fields)
            .map(|_| StateField::decode(buf))
            .collect::<CodecResult<Vec<_>>>()?;

        Ok(Self {
            node,
            name,
            ports,
            fields,
        })
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' ports={} fields={}",
            self.node,
            self.name,
            self.ports.len(),
            self.fields.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{IntDisplay, IntWidth, NodeKind};

    fn sample_module() -> Module {
        Module::new(
            NodeId::module(NodeKind::HardwareModule, 4, 1).unwrap(),
            "Route Lookup",
        )
        .with_ports(vec![
            Port::new(0, "in", "Packets to look up"),
            Port::new(1, "out", "Routed packets"),
        ])
        .with_fields(vec![
            StateField::int("hits", "Lookup hits", true, IntWidth::U64, IntDisplay::Int),
            StateField::choice("mode", "", false, vec![(0, "lpm".into()), (1, "exact".into())]),
        ])
    }

    #[test]
    fn test_node_info_roundtrip() {
        let info = NodeInfo::new(
            NodeId::new(NodeKind::ExternalComputer, 2000),
            "pc1",
            "Core 2 Duo with 1G RAM",
        );
        let bytes = info.to_bytes();
        assert_eq!(bytes.len(), NodeInfo::SIZE);

        let (decoded, consumed) = NodeInfo::decode_prefix(&bytes).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(consumed, NodeInfo::SIZE);
    }

    #[test]
    fn test_port_layout() {
        let port = Port::new(7, "eth0", "uplink");
        let bytes = port.to_bytes();
        assert_eq!(&bytes[..], b"\x00\x07\x05eth0\0\x07uplink\0");
        assert_eq!(port.encoded_len(), bytes.len());
    }

    #[test]
    fn test_port_truncates_long_strings() {
        let port = Port::new(1, &"n".repeat(40), &"d".repeat(200));
        assert_eq!(port.name.len(), Port::NAME_LEN_MAX);
        assert_eq!(port.desc.len(), Port::DESC_LEN_MAX);
        assert_eq!(port.encoded_len(), 2 + 34 + 130);
    }

    #[test]
    fn test_module_roundtrip() {
        let module = sample_module();
        let bytes = module.to_bytes();
        assert_eq!(bytes.len(), module.encoded_len());

        let (decoded, consumed) = Module::decode_prefix(&bytes).unwrap();
        assert_eq!(decoded, module);
        assert_eq!(consumed, module.encoded_len());
        assert_eq!(decoded.node.module_parts(), (4, 1));
    }

    #[test]
    fn test_module_truncated() {
        let bytes = sample_module().to_bytes();
        for len in 0..bytes.len() {
            let err = Module::decode_prefix(&bytes[..len]).unwrap_err();
            assert!(err.is_format_error(), "len {}: {:?}", len, err);
        }
    }
}
