//! In-memory demo backend
//!
//! Serves a canned topology and module catalogue so a GUI can be exercised
//! without any hardware attached. State values written by the GUI are kept
//! in memory for the lifetime of the process.

use std::collections::HashMap;

use crate::protocol::{
    IntDisplay, IntWidth, Message, Module, ModuleStatus, NodeId, NodeInfo, NodeKind, Port,
    StateField, StateValue, ValueKind,
};

fn hw_module(id: u64) -> NodeId {
    NodeId::new(NodeKind::HardwareModule, id)
}

fn sw_module(id: u64) -> NodeId {
    NodeId::new(NodeKind::SoftwareModule, id)
}

fn netfpga(id: u64) -> NodeId {
    NodeId::new(NodeKind::HardwareSwitch, id)
}

fn pc(id: u64) -> NodeId {
    NodeId::new(NodeKind::ExternalComputer, id)
}

/// Identity of a stored value: table rows with the same name are told apart by entry
fn value_key(value: &StateValue) -> (&str, Option<u16>) {
    match &value.kind {
        ValueKind::Int { .. } => (value.name.as_str(), None),
        ValueKind::TableEntry { entry, .. } => (value.name.as_str(), Some(*entry)),
    }
}

/// Backend that answers GUI requests from an in-memory catalogue
#[derive(Debug, Clone)]
pub struct DemoBackend {
    modules: Vec<Module>,
    values: HashMap<NodeId, Vec<StateValue>>,
    placements: HashMap<NodeId, NodeId>,
}

impl DemoBackend {
    pub fn new() -> Self {
        let mut values = HashMap::new();
        values.insert(
            hw_module(1),
            vec![StateValue::u64("hits", 0), StateValue::u32("learning", 1)],
        );
        values.insert(hw_module(3), vec![StateValue::u32("fault", 0)]);
        values.insert(
            hw_module(4),
            vec![StateValue::table_entry(
                "routes",
                0,
                vec![
                    StateValue::u32("prefix", 0x0a00_0000),
                    StateValue::u32("mask", 0xff00_0000),
                    StateValue::u32("next_hop", 0x0a00_0001),
                    StateValue::u32("port", 1),
                ],
            )],
        );

        Self {
            modules: catalogue(),
            values,
            placements: HashMap::new(),
        }
    }

    /// Modules offered to the GUI
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Stored values of a module
    pub fn values(&self, module: &NodeId) -> &[StateValue] {
        self.values.get(module).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Node a module is currently placed on
    pub fn placement(&self, module: &NodeId) -> Option<NodeId> {
        self.placements.get(module).copied()
    }

    /// Messages pushed to a GUI as soon as it connects
    pub fn announcements(&self) -> Vec<Message> {
        let nodes = vec![
            NodeInfo::new(NodeId::new(NodeKind::Input, 111), "Input", "Input"),
            NodeInfo::new(NodeId::new(NodeKind::Output, 999), "Output", "Output"),
            NodeInfo::new(netfpga(1000), "NetFPGA", "NetFPGA"),
            NodeInfo::new(netfpga(1001), "NetFPGA", "NetFPGA"),
            NodeInfo::new(netfpga(1002), "NetFPGA", "NetFPGA"),
            NodeInfo::new(netfpga(1003), "NetFPGA", "NetFPGA"),
            NodeInfo::new(netfpga(1004), "NetFPGA", "NetFPGA"),
            NodeInfo::new(netfpga(1005), "NetFPGA", "NetFPGA"),
            NodeInfo::new(netfpga(1006), "NetFPGA", "NetFPGA"),
            NodeInfo::new(pc(2000), "pc1", "Core 2 Duo with 1G RAM"),
            NodeInfo::new(pc(2001), "pc2", "Core 2 Duo with 2G RAM"),
            NodeInfo::new(pc(2002), "pc3", "Centrino with 1G RAM"),
            NodeInfo::new(pc(2003), "pc4", "Centrino with 1G RAM"),
        ];
        let departed = vec![
            NodeInfo::new(netfpga(1006), "NetFPGA", "NetFPGA"),
            NodeInfo::new(pc(2003), "pc4", "Centrino with 1G RAM"),
        ];

        vec![
            Message::ModulesAdd {
                modules: self.modules.clone(),
            },
            Message::NodesAdd { nodes },
            Message::NodesDel { nodes: departed },
            Message::TestInfo {
                input: "hello world".to_string(),
                output: "happy world".to_string(),
            },
            Message::ModuleStatusReply {
                node: netfpga(1000),
                module: hw_module(4),
                status: "it works!".to_string(),
            },
        ]
    }

    /// Apply a request from the GUI and produce the replies to send back
    pub fn handle(&mut self, message: &Message) -> Vec<Message> {
        match message {
            Message::ModuleStatusRequest { node, module } => {
                vec![Message::ModuleStatusReply {
                    node: *node,
                    module: *module,
                    status: self.status_of(node, module),
                }]
            }
            Message::ReadStateValues { module, names } => {
                let stored = self.values(module);
                let values = names
                    .iter()
                    .flat_map(|name| stored.iter().filter(move |v| &v.name == name))
                    .cloned()
                    .collect();
                vec![Message::SetStateValues {
                    module: *module,
                    values,
                }]
            }
            Message::SetStateValues { module, values } => {
                let stored = self.values.entry(*module).or_default();
                for value in values {
                    let key = value_key(value);
                    match stored.iter_mut().find(|v| value_key(v) == key) {
                        Some(existing) => *existing = value.clone(),
                        None => stored.push(value.clone()),
                    }
                }
                tracing::info!("Stored {} value(s) for {}", values.len(), module);
                vec![Message::ModuleAlert {
                    module: *module,
                    message: format!("updated {} state value(s)", values.len()),
                }]
            }
            Message::MoveModule { module, from, to } => {
                if !from.is_none() {
                    self.placements.remove(module);
                }
                let mut replies = vec![message.clone()];
                if !to.is_none() {
                    self.placements.insert(*module, *to);
                    replies.push(Message::ModuleStatusChange {
                        module: *module,
                        status: ModuleStatus::Ready,
                    });
                }
                tracing::info!("Moved {} from {} to {}", module, from, to);
                replies
            }
            other => {
                tracing::info!("Ignoring {}", other);
                Vec::new()
            }
        }
    }

    fn status_of(&self, node: &NodeId, module: &NodeId) -> String {
        if !self.modules.iter().any(|m| m.node == *module) {
            return "unknown module".to_string();
        }
        match self.placements.get(module) {
            Some(placed) if placed == node => "running".to_string(),
            Some(placed) => format!("running on {}", placed),
            None => "idle".to_string(),
        }
    }
}

impl Default for DemoBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn standard_ports() -> Vec<Port> {
    vec![
        Port::new(0, "in", "Packets entering the module"),
        Port::new(1, "out", "Packets leaving the module"),
    ]
}

fn catalogue() -> Vec<Module> {
    vec![
        Module::new(hw_module(1), "MAC Lookup")
            .with_ports(standard_ports())
            .with_fields(vec![
                StateField::int("hits", "Lookup hits", true, IntWidth::U64, IntDisplay::Int),
                StateField::int("learning", "Learn source addresses", false, IntWidth::U32, IntDisplay::Bool),
            ]),
        Module::new(hw_module(2), "TTL Decrement").with_ports(standard_ports()),
        Module::new(hw_module(3), "TTL Decrement (FAULTY)")
            .with_ports(standard_ports())
            .with_fields(vec![StateField::choice(
                "fault",
                "Injected fault",
                false,
                vec![
                    (0, "none".to_string()),
                    (1, "skip decrement".to_string()),
                    (2, "decrement twice".to_string()),
                ],
            )]),
        Module::new(hw_module(4), "Route Lookup")
            .with_ports(vec![
                Port::new(0, "in", "Packets entering the module"),
                Port::new(1, "out", "Forwarded packets"),
                Port::new(2, "miss", "Packets without a route"),
            ])
            .with_fields(vec![StateField::table(
                "routes",
                "Routing table",
                false,
                32,
                vec![
                    StateField::int("prefix", "Destination prefix", false, IntWidth::U32, IntDisplay::Ip),
                    StateField::int("mask", "Prefix mask", false, IntWidth::U32, IntDisplay::Ip),
                    StateField::int("next_hop", "Next hop address", false, IntWidth::U32, IntDisplay::Ip),
                    StateField::int("port", "Output port", false, IntWidth::U32, IntDisplay::Int),
                ],
            )]),
        Module::new(hw_module(5), "Checksum Update").with_ports(standard_ports()),
        Module::new(hw_module(6), "TTL / Checksum Validate").with_ports(standard_ports()),
        Module::new(sw_module(100), "TTL / Checksum Validate").with_ports(standard_ports()),
        Module::new(sw_module(101), "Comparison Module")
            .with_ports(vec![
                Port::new(0, "left", "First packet stream"),
                Port::new(1, "right", "Second packet stream"),
            ])
            .with_fields(vec![StateField::int(
                "mismatches",
                "Packets that differed",
                true,
                IntWidth::U64,
                IntDisplay::Int,
            )]),
    ]
}
