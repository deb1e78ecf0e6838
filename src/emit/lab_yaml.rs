//! CML lab document.
//!
//! Switches come first (`n0..`), then every other node in plan order.
//! Interface ids are `i<slot>` (`i<port>` on switches), links are `l0..`.
//! The document carries no timestamps, so identical parameters always
//! serialize to identical bytes.

use serde::Serialize;

use crate::error::EmissionError;
use crate::params::GenerationParams;
use crate::synth::SynthesizedLab;
use crate::topology::{Endpoint, Node, Role, Switch};

pub const SWITCH_DEFINITION: &str = "unmanaged_switch";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabDocument {
    pub lab: LabMeta,
    pub nodes: Vec<DocNode>,
    pub links: Vec<DocLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabMeta {
    pub title: String,
    pub description: String,
    pub notes: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocNode {
    pub id: String,
    pub label: String,
    pub node_definition: String,
    pub x: i64,
    pub y: i64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hide_links: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
    pub interfaces: Vec<DocInterface>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocInterface {
    pub id: String,
    pub slot: u32,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocLink {
    pub id: String,
    pub n1: String,
    pub i1: String,
    pub n2: String,
    pub i2: String,
}

/// Tag naming a node's role on the canvas.
pub fn role_tag(role: Role) -> &'static str {
    match role {
        Role::Router => "router",
        Role::PairPeer => "pair-peer",
        Role::Hub => "hub",
        Role::Spoke => "spoke",
        Role::CertificateAuthority => "pki",
        Role::DnsHost => "dns",
        Role::ExternalConnector => "external",
    }
}

pub fn node_tags(node: &Node) -> Vec<String> {
    vec![role_tag(node.role).to_string()]
}

/// One-line summary of the generation parameters, secrets excluded.
pub fn summary(params: &GenerationParams) -> String {
    let mut bits = vec![
        format!("nodes={}", params.nodes),
        format!("-m {}", params.shape),
        format!("-T {}", params.template),
        format!("--device-template {}", params.platform.node_definition()),
        format!("--group-size {}", params.group_size),
        format!("--distance {}", params.distance),
    ];
    if params.addressing.loopback_255 {
        bits.push("--loopback-255".to_string());
    }
    if params.addressing.gi0_zero {
        bits.push("--gi0-zero".to_string());
    }
    if let Some(vrf) = &params.pair_vrf {
        bits.push(format!("--vrf --pair-vrf {vrf}"));
    }
    if let Some(overlay) = &params.overlay {
        let hubs: Vec<String> = overlay.hubs.iter().map(u32::to_string).collect();
        bits.push(format!("--hubs {}", hubs.join(",")));
        bits.push(format!("--phase {}", overlay.phase));
        bits.push(format!("--security {:?}", overlay.security).to_lowercase());
    }
    if let Some(mesh) = &params.mesh {
        bits.push(format!("--mesh-seed {}", mesh.seed));
    }
    if let Some(mgmt) = &params.management {
        bits.push(format!("--mgmt --mgmt-cidr {} --mgmt-slot {}", mgmt.cidr, mgmt.slot));
        if let Some(gw) = mgmt.gateway {
            bits.push(format!("--mgmt-gw {gw}"));
        }
        if let Some(vrf) = &mgmt.vrf {
            bits.push(format!("--mgmt-vrf {vrf}"));
        }
    }
    if let Some(ntp) = &params.ntp {
        bits.push(format!("--ntp {}", ntp.server));
        if let Some(vrf) = &ntp.vrf {
            bits.push(format!("--ntp-vrf {vrf}"));
        }
    }
    if params.pki.is_some() {
        bits.push("--pki".to_string());
    }
    bits.push(format!("--cml-version {}", params.schema_version.as_str()));
    bits.join(" ")
}

impl LabDocument {
    pub fn from_lab(lab: &SynthesizedLab, backend: &str) -> Result<Self, EmissionError> {
        let params = &lab.params;
        let plan = &lab.plan;
        let switch_id = |idx: usize| format!("n{idx}");
        let node_id = |idx: usize| format!("n{}", plan.switches.len() + idx);

        let mut nodes = Vec::with_capacity(plan.switches.len() + plan.nodes.len());
        for (idx, switch) in plan.switches.iter().enumerate() {
            nodes.push(switch_node(switch_id(idx), switch));
        }
        for (idx, node) in plan.nodes.iter().enumerate() {
            nodes.push(DocNode {
                id: node_id(idx),
                label: node.label.clone(),
                node_definition: node.definition.clone(),
                x: node.position.x,
                y: node.position.y,
                hide_links: false,
                tags: node_tags(node),
                configuration: node.configuration().map(|c| c.trim_end().to_string()),
                interfaces: node
                    .physical_interfaces()
                    .map(|iface| DocInterface {
                        id: format!("i{}", iface.slot),
                        slot: iface.slot,
                        label: node.interface_label(params.platform, iface.slot),
                        kind: "physical".to_string(),
                    })
                    .collect(),
            });
        }

        let endpoint_ids = |endpoint: &Endpoint| match *endpoint {
            Endpoint::Node { node, slot } => (node_id(node), format!("i{slot}")),
            Endpoint::Switch { switch, port } => (switch_id(switch), format!("i{port}")),
        };
        let links = plan
            .links
            .iter()
            .enumerate()
            .map(|(k, link)| {
                let (n1, i1) = endpoint_ids(&link.a);
                let (n2, i2) = endpoint_ids(&link.b);
                DocLink {
                    id: format!("l{k}"),
                    n1,
                    i1,
                    n2,
                    i2,
                }
            })
            .collect();

        Ok(LabDocument {
            lab: LabMeta {
                title: params.lab_name.clone(),
                description: format!(
                    "Generated by topogen v{} ({backend}) | args: {}",
                    env!("CARGO_PKG_VERSION"),
                    summary(params)
                ),
                notes: serde_yaml::to_string(params)?,
                version: params.schema_version.as_str().to_string(),
            },
            nodes,
            links,
        })
    }

    pub fn to_yaml(&self) -> Result<String, EmissionError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn switch_node(id: String, switch: &Switch) -> DocNode {
    DocNode {
        id,
        label: switch.label.clone(),
        node_definition: SWITCH_DEFINITION.to_string(),
        x: switch.position.x,
        y: switch.position.y,
        hide_links: switch.hide_links,
        tags: Vec::new(),
        configuration: None,
        interfaces: (0..switch.port_count())
            .map(|port| DocInterface {
                id: format!("i{port}"),
                slot: port,
                label: format!("port{port}"),
                kind: "physical".to_string(),
            })
            .collect(),
    }
}
