//! Topology builder.
//!
//! One strategy per [`Shape`], all writing into a [`TopologyPlan`] through
//! the shared fabric helper. The certificate authority and the management
//! fabric are layered on top the same way for every shape.

pub mod authority;
pub mod fabric;
pub mod management;
pub mod mesh;
pub mod overlay;
pub mod paired;
pub mod star;
pub mod types;

use log::info;

use crate::error::{ParameterError, TopogenError};
use crate::ip::{AddressPlan, PoolDemand};
use crate::params::{GenerationParams, Shape};

pub use authority::Attachment;
pub use fabric::{FabricLayout, FabricSpec};
pub use types::{
    Endpoint, Fabric, Interface, InterfaceRole, Link, Node, NodeIndex, OverlayAdjacency,
    Placement, Point, Role, Switch, SwitchIndex, Tier, TopologyPlan, TUNNEL_SLOT,
};

const DATA_PREFIX: &str = "SW";

/// Build the complete lab graph for `params`.
///
/// Pool capacity is checked against the whole demand before the first
/// node is created.
pub fn build(params: &GenerationParams, addresses: &AddressPlan) -> Result<TopologyPlan, TopogenError> {
    let edges = match (params.shape, &params.mesh) {
        (Shape::PartialMesh, Some(mesh)) => mesh::draw_edges(params.nodes, mesh),
        _ => Vec::new(),
    };
    let certificate_authority = params.pki.is_some();
    let links = match params.shape {
        Shape::PartialMesh => edges.len() as u32 + 1 + u32::from(certificate_authority),
        _ if params.is_paired() => params.nodes / 2,
        _ => 0,
    };
    addresses.validate(&PoolDemand {
        routers: params.nodes,
        links,
        certificate_authority,
    })?;

    let mut plan = TopologyPlan::new(params.shape);
    let attachment = match (params.shape, &params.overlay) {
        (Shape::Star, _) => {
            let layout = star::build(&mut plan, params, addresses, |_| Role::Router, DATA_PREFIX)?;
            Attachment::Switch(layout.core)
        }
        (Shape::PairedStar, _) => {
            let layout =
                paired::build(&mut plan, params, addresses, paired::default_role, DATA_PREFIX)?;
            Attachment::Switch(layout.core)
        }
        (Shape::HubOverlay, Some(overlay)) => {
            Attachment::Switch(overlay::build(&mut plan, params, addresses, overlay)?.core)
        }
        (Shape::HubOverlay, None) => {
            return Err(ParameterError::MissingDependency {
                feature: "the hub-overlay shape",
                dependency: "overlay parameters",
            }
            .into())
        }
        (Shape::PartialMesh, _) => Attachment::Router(mesh::build(&mut plan, params, addresses, &edges)?),
    };

    if let Some(pki) = &params.pki {
        authority::inject(&mut plan, params, pki, addresses, attachment)?;
    }

    if let Some(mgmt) = &params.management {
        management::attach(&mut plan, mgmt, params.group_size, addresses)?;
    }

    info!(
        "Built {} topology: {} nodes, {} switches, {} links",
        params.shape,
        plan.nodes.len(),
        plan.switches.len(),
        plan.links.len()
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::params::{ManagementParams, PkiParams};

    fn build_for(params: &GenerationParams) -> TopologyPlan {
        let addresses = AddressPlan::new(params, &Config::default());
        build(params, &addresses).unwrap()
    }

    #[test]
    fn test_overlay_multi_hub_adjacency() {
        let mut params = GenerationParams::new(Shape::HubOverlay, 63);
        params.overlay.as_mut().unwrap().hubs = vec![1, 21, 41];
        let plan = build_for(&params);

        let hubs: Vec<NodeIndex> = plan.nodes_with_role(Role::Hub).map(|(i, _)| i).collect();
        assert_eq!(hubs.len(), 3);
        assert_eq!(plan.nodes_with_role(Role::Spoke).count(), 60);
        assert_eq!(plan.overlay.len(), 60);
        for (idx, _) in plan.nodes_with_role(Role::Spoke) {
            let peers: Vec<_> = plan.overlay.iter().filter(|adj| adj.spoke == idx).collect();
            assert_eq!(peers.len(), 1);
            assert!(hubs.contains(&peers[0].hub));
        }
    }

    #[test]
    fn test_ca_on_mesh_links_to_core_router() {
        let mut params = GenerationParams::new(Shape::PartialMesh, 10);
        params.pki = Some(PkiParams::from_config(&Config::default()));
        let plan = build_for(&params);
        let (ca, node) = plan.nodes_with_role(Role::CertificateAuthority).next().unwrap();
        assert_eq!(node.interface(0).unwrap().address.unwrap().prefix, 30);
        let core = plan.core_router.unwrap();
        assert!(plan.links.iter().any(|l| matches!(
            (l.a, l.b),
            (Endpoint::Node { node: a, .. }, Endpoint::Node { node: b, .. }) if a == ca && b == core
        )));
    }

    #[test]
    fn test_management_fabric_includes_ca() {
        let mut params = GenerationParams::new(Shape::Star, 8);
        params.pki = Some(PkiParams::from_config(&Config::default()));
        params.management = Some(ManagementParams::default());
        let plan = build_for(&params);
        let ca = plan.node_by_label("CA-ROOT").unwrap();
        assert_eq!(ca.interface(5).unwrap().address.unwrap().to_string(), "10.254.255.254/16");
        let oob_core = plan.switches.iter().find(|sw| sw.label == "SWoob0").unwrap();
        assert_eq!(oob_core.port_count(), 2);
    }
}
