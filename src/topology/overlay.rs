//! Hub/multi-hub overlay (DMVPN) over a star or paired-star underlay.
//!
//! Hubs are an explicit ordinal set. Every overlay endpoint gets a logical
//! tunnel interface; every spoke gets exactly one adjacency, to its
//! primary hub, which is the closest hub at or below the spoke's ordinal
//! (or the lowest hub for spokes below all of them). Spokes never peer with
//! each other.

use std::collections::{BTreeSet, HashMap};

use log::info;

use crate::error::CapacityError;
use crate::ip::{AddressPlan, PoolKind};
use crate::params::{GenerationParams, OverlayParams, Underlay};
use crate::topology::fabric::FabricLayout;
use crate::topology::types::{Interface, OverlayAdjacency, Role, TopologyPlan};
use crate::topology::{paired, star};

const FABRIC_PREFIX: &str = "SWnbma";

pub fn build(
    plan: &mut TopologyPlan,
    params: &GenerationParams,
    addresses: &AddressPlan,
    overlay: &OverlayParams,
) -> Result<FabricLayout, CapacityError> {
    let hubs: BTreeSet<u32> = overlay.hubs.iter().copied().collect();
    let endpoint_role = |n: u32| {
        if hubs.contains(&n) {
            Role::Hub
        } else {
            Role::Spoke
        }
    };

    let layout = match overlay.underlay {
        Underlay::Star => star::build(plan, params, addresses, endpoint_role, FABRIC_PREFIX)?,
        Underlay::PairedStar => paired::build(
            plan,
            params,
            addresses,
            |n| {
                if n % 2 == 0 {
                    Role::PairPeer
                } else {
                    endpoint_role(n)
                }
            },
            FABRIC_PREFIX,
        )?,
    };

    let tunnel_pool = addresses.pool(PoolKind::Overlay)?;
    let mut by_ordinal = HashMap::new();
    for (idx, node) in plan.nodes.iter_mut().enumerate() {
        if node.role.is_overlay_endpoint() {
            node.interfaces
                .push(Interface::tunnel(tunnel_pool.host(node.ordinal)?));
            by_ordinal.insert(node.ordinal, idx);
        }
    }

    let mut adjacencies = Vec::new();
    for (idx, node) in plan.nodes.iter().enumerate() {
        if node.role != Role::Spoke {
            continue;
        }
        let primary = primary_hub(&hubs, node.ordinal);
        if let Some(&hub) = primary.and_then(|h| by_ordinal.get(&h)) {
            adjacencies.push(OverlayAdjacency { hub, spoke: idx });
        }
    }
    plan.overlay = adjacencies;

    info!(
        "Overlay: {} hubs, {} spokes",
        hubs.len(),
        plan.overlay.len()
    );
    Ok(layout)
}

/// Closest hub at or below `spoke`, else the lowest hub.
pub fn primary_hub(hubs: &BTreeSet<u32>, spoke: u32) -> Option<u32> {
    hubs.range(..=spoke)
        .next_back()
        .or_else(|| hubs.iter().next())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::params::Shape;
    use crate::topology::TUNNEL_SLOT;

    fn build_overlay(nodes: u32, overlay: OverlayParams) -> TopologyPlan {
        let mut params = GenerationParams::new(Shape::HubOverlay, nodes);
        params.overlay = Some(overlay.clone());
        let addresses = AddressPlan::new(&params, &Config::default());
        let mut plan = TopologyPlan::new(Shape::HubOverlay);
        build(&mut plan, &params, &addresses, &overlay).unwrap();
        plan
    }

    #[test]
    fn test_primary_hub_selection() {
        let hubs: BTreeSet<u32> = [5, 21, 41].into_iter().collect();
        assert_eq!(primary_hub(&hubs, 2), Some(5));
        assert_eq!(primary_hub(&hubs, 20), Some(5));
        assert_eq!(primary_hub(&hubs, 22), Some(21));
        assert_eq!(primary_hub(&hubs, 63), Some(41));
    }

    #[test]
    fn test_single_default_hub() {
        let plan = build_overlay(5, OverlayParams::default());
        assert_eq!(plan.nodes_with_role(Role::Hub).count(), 1);
        assert_eq!(plan.nodes_with_role(Role::Spoke).count(), 4);
        assert_eq!(plan.switches[0].label, "SWnbma0");
        let r1 = plan.node_by_label("R1").unwrap();
        assert_eq!(r1.interface(TUNNEL_SLOT).unwrap().address.unwrap().to_string(), "172.20.0.1/16");
        assert!(!r1.tunnel().unwrap().physical);
    }

    #[test]
    fn test_paired_underlay_only_odd_endpoints() {
        let overlay = OverlayParams {
            underlay: Underlay::PairedStar,
            hubs: vec![1],
            ..OverlayParams::default()
        };
        let plan = build_overlay(6, overlay);
        assert_eq!(plan.nodes_with_role(Role::PairPeer).count(), 3);
        assert_eq!(plan.nodes_with_role(Role::Spoke).count(), 2);
        assert!(plan.node_by_label("R2").unwrap().tunnel().is_none());
        assert_eq!(plan.overlay.len(), 2);
    }
}
