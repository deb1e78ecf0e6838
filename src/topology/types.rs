//! Topology type definitions.
//!
//! Nodes own their interfaces; links and switch ports only hold indices
//! into the plan, so the whole graph is a plain value that later stages
//! can walk without shared ownership.

use serde::Serialize;

use crate::error::SynthesisError;
use crate::ip::IfaceAddr;
use crate::params::{Platform, Shape};

pub type NodeIndex = usize;
pub type SwitchIndex = usize;

/// Slot of the logical overlay tunnel. Never emitted as a physical port.
pub const TUNNEL_SLOT: u32 = 1000;

/// What a node is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Ordinary router (star member, odd router of a pair, mesh member)
    Router,
    /// Even router of a pair, reachable only through its partner
    PairPeer,
    Hub,
    Spoke,
    CertificateAuthority,
    DnsHost,
    ExternalConnector,
}

impl Role {
    /// Routers carry a router ordinal and an IOS configuration.
    pub fn is_router(&self) -> bool {
        matches!(self, Role::Router | Role::PairPeer | Role::Hub | Role::Spoke)
    }

    pub fn is_overlay_endpoint(&self) -> bool {
        matches!(self, Role::Hub | Role::Spoke)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterfaceRole {
    /// Attachment to the data switch fabric
    Uplink,
    /// Odd/even pair link
    PairLink,
    /// Partial-mesh link
    Mesh,
    Management,
    /// Logical overlay tunnel
    Overlay,
    /// DNS host or external connector side links
    Service,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub slot: u32,
    pub role: InterfaceRole,
    /// `None` leaves the interface unaddressed.
    pub address: Option<IfaceAddr>,
    pub vrf: Option<String>,
    /// Physical interfaces appear in the lab document; the tunnel does not.
    pub physical: bool,
}

impl Interface {
    pub fn physical(slot: u32, role: InterfaceRole, address: Option<IfaceAddr>) -> Self {
        Interface {
            slot,
            role,
            address,
            vrf: None,
            physical: true,
        }
    }

    pub fn tunnel(address: IfaceAddr) -> Self {
        Interface {
            slot: TUNNEL_SLOT,
            role: InterfaceRole::Overlay,
            address: Some(address),
            vrf: None,
            physical: false,
        }
    }

    pub fn with_vrf(mut self, vrf: Option<String>) -> Self {
        self.vrf = vrf;
        self
    }
}

/// Where the builder wants a node drawn; turned into a [`Point`] by the
/// planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    Unplaced,
    /// Column 0 is the core switch; negative columns hold the management
    /// fabric. Row 0 is the switch row.
    Grid { column: i32, row: u32 },
    /// Position along a square spiral around the origin.
    Spiral { index: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Router number; 0 for singleton service nodes.
    pub ordinal: u32,
    pub label: String,
    pub role: Role,
    pub definition: String,
    pub loopback: Option<IfaceAddr>,
    pub interfaces: Vec<Interface>,
    pub placement: Placement,
    pub position: Point,
    configuration: Option<String>,
}

impl Node {
    pub fn new(ordinal: u32, label: impl Into<String>, role: Role, definition: &str) -> Self {
        Node {
            ordinal,
            label: label.into(),
            role,
            definition: definition.to_string(),
            loopback: None,
            interfaces: Vec::new(),
            placement: Placement::Unplaced,
            position: Point::default(),
            configuration: None,
        }
    }

    pub fn interface(&self, slot: u32) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.slot == slot)
    }

    /// Interfaces that exist on the device, as opposed to the logical tunnel.
    pub fn physical_interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter().filter(|iface| iface.physical)
    }

    pub fn tunnel(&self) -> Option<&Interface> {
        self.interface(TUNNEL_SLOT)
    }

    /// Lowest physical slot not yet used, skipping `reserved`.
    pub fn next_free_slot(&self, reserved: Option<u32>) -> u32 {
        (0..)
            .find(|slot| Some(*slot) != reserved && self.interface(*slot).is_none())
            .unwrap_or(0)
    }

    /// Device-facing name of a slot.
    pub fn interface_label(&self, platform: Platform, slot: u32) -> String {
        match self.role {
            Role::DnsHost => format!("eth{slot}"),
            Role::ExternalConnector => "port".to_string(),
            _ if slot == TUNNEL_SLOT => "Tunnel0".to_string(),
            _ => platform.interface_label(slot),
        }
    }

    pub fn configuration(&self) -> Option<&str> {
        self.configuration.as_deref()
    }

    /// Attach the rendered configuration. A node is configured exactly once.
    pub fn assign_configuration(&mut self, text: String) -> Result<(), SynthesisError> {
        if self.configuration.is_some() {
            return Err(SynthesisError::AlreadyConfigured {
                node: self.label.clone(),
            });
        }
        self.configuration = Some(text);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fabric {
    Data,
    Management,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Core,
    Access,
}

/// One end of a physical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Node { node: NodeIndex, slot: u32 },
    Switch { switch: SwitchIndex, port: u32 },
}

/// Unmanaged switch. `ports[i]` is whatever sits on port `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub label: String,
    pub fabric: Fabric,
    pub tier: Tier,
    pub ports: Vec<Endpoint>,
    pub hide_links: bool,
    pub placement: Placement,
    pub position: Point,
}

impl Switch {
    pub fn new(label: impl Into<String>, fabric: Fabric, tier: Tier) -> Self {
        Switch {
            label: label.into(),
            fabric,
            tier,
            ports: Vec::new(),
            hide_links: fabric == Fabric::Management,
            placement: Placement::Unplaced,
            position: Point::default(),
        }
    }

    /// Occupy the next port, returning its number.
    pub fn attach(&mut self, endpoint: Endpoint) -> u32 {
        self.ports.push(endpoint);
        (self.ports.len() - 1) as u32
    }

    pub fn port_count(&self) -> u32 {
        self.ports.len() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub a: Endpoint,
    pub b: Endpoint,
}

/// Logical tunnel adjacency from a spoke to its primary hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayAdjacency {
    pub hub: NodeIndex,
    pub spoke: NodeIndex,
}

/// The full lab graph.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyPlan {
    pub shape: Shape,
    pub nodes: Vec<Node>,
    pub switches: Vec<Switch>,
    pub links: Vec<Link>,
    pub overlay: Vec<OverlayAdjacency>,
    /// Router the DNS host hangs off in a partial mesh.
    pub core_router: Option<NodeIndex>,
    /// /30 subnets taken from the point-to-point pool so far.
    pub carved_links: u32,
}

impl TopologyPlan {
    pub fn new(shape: Shape) -> Self {
        TopologyPlan {
            shape,
            nodes: Vec::new(),
            switches: Vec::new(),
            links: Vec::new(),
            overlay: Vec::new(),
            core_router: None,
            carved_links: 0,
        }
    }

    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn add_switch(&mut self, switch: Switch) -> SwitchIndex {
        self.switches.push(switch);
        self.switches.len() - 1
    }

    /// Link a node interface to the next free port of a switch.
    pub fn attach_to_switch(&mut self, node: NodeIndex, slot: u32, switch: SwitchIndex) -> u32 {
        let port = self.switches[switch].attach(Endpoint::Node { node, slot });
        self.links.push(Link {
            a: Endpoint::Node { node, slot },
            b: Endpoint::Switch { switch, port },
        });
        port
    }

    /// Link two node interfaces directly.
    pub fn connect(&mut self, a: (NodeIndex, u32), b: (NodeIndex, u32)) {
        self.links.push(Link {
            a: Endpoint::Node { node: a.0, slot: a.1 },
            b: Endpoint::Node { node: b.0, slot: b.1 },
        });
    }

    /// Ordinal of the next /30 to carve, advancing the counter.
    pub fn next_link_ordinal(&mut self) -> u32 {
        self.carved_links += 1;
        self.carved_links
    }

    pub fn routers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.role.is_router())
    }

    pub fn router_count(&self) -> u32 {
        self.routers().count() as u32
    }

    pub fn nodes_with_role(&self, role: Role) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, node)| node.role == role)
    }

    pub fn node_by_label(&self, label: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.label == label)
    }

    #[cfg(test)]
    pub fn switches_in(&self, fabric: Fabric, tier: Tier) -> impl Iterator<Item = &Switch> {
        self.switches
            .iter()
            .filter(move |sw| sw.fabric == fabric && sw.tier == tier)
    }

    /// Human-readable name of an endpoint, e.g. "R3 slot 1" or "SW2 port 4".
    pub fn describe(&self, endpoint: &Endpoint) -> String {
        match endpoint {
            Endpoint::Node { node, slot } => format!("{} slot {}", self.nodes[*node].label, slot),
            Endpoint::Switch { switch, port } => {
                format!("{} port {}", self.switches[*switch].label, port)
            }
        }
    }
}
