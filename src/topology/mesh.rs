//! Partially-meshed shape.
//!
//! Routers form a backbone chain `R1 - R2 - ... - RN` so the graph is
//! always connected, then each router may add one chord to a random peer.
//! The RNG is seeded from the parameters, so the same seed always yields
//! the same edge list. Every edge is a /30 from the point-to-point pool.
//!
//! The best-connected router becomes the core: a DNS host hangs off it and
//! reaches the outside world through an external connector.

use std::collections::HashSet;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::CapacityError;
use crate::ip::AddressPlan;
use crate::params::{GenerationParams, MeshParams};
use crate::topology::types::{
    Interface, InterfaceRole, Node, NodeIndex, Placement, Role, TopologyPlan,
};

pub const DNS_HOST_LABEL: &str = "dns-host";
pub const DNS_HOST_DEFINITION: &str = "alpine";
pub const CONNECTOR_LABEL: &str = "ext-conn-0";
pub const CONNECTOR_DEFINITION: &str = "external_connector";

/// Router-to-router edges as (lower, higher) ordinal pairs, chain first.
pub fn draw_edges(nodes: u32, mesh: &MeshParams) -> Vec<(u32, u32)> {
    let mut rng = StdRng::seed_from_u64(mesh.seed);
    let mut degree = vec![0u32; nodes as usize + 1];
    let mut seen = HashSet::new();
    let mut edges = Vec::new();

    let mut add = |a: u32, b: u32, degree: &mut [u32]| {
        let key = (a.min(b), a.max(b));
        if seen.insert(key) {
            degree[a as usize] += 1;
            degree[b as usize] += 1;
            edges.push(key);
        }
    };

    for n in 1..nodes {
        add(n, n + 1, degree.as_mut_slice());
    }

    for n in 1..=nodes {
        if !rng.gen_bool(mesh.chord_probability) {
            continue;
        }
        let peer = rng.gen_range(1..=nodes);
        if peer == n || peer.abs_diff(n) == 1 {
            continue;
        }
        if degree[n as usize] >= mesh.max_degree || degree[peer as usize] >= mesh.max_degree {
            continue;
        }
        add(n, peer, degree.as_mut_slice());
    }

    edges
}

/// Core router: highest degree, lowest ordinal on ties.
pub fn core_ordinal(nodes: u32, edges: &[(u32, u32)]) -> u32 {
    let mut degree = vec![0u32; nodes as usize + 1];
    for &(a, b) in edges {
        degree[a as usize] += 1;
        degree[b as usize] += 1;
    }
    (1..=nodes)
        .max_by_key(|&n| (degree[n as usize], std::cmp::Reverse(n)))
        .unwrap_or(1)
}

pub fn build(
    plan: &mut TopologyPlan,
    params: &GenerationParams,
    addresses: &AddressPlan,
    edges: &[(u32, u32)],
) -> Result<NodeIndex, CapacityError> {
    let reserved = params.management.as_ref().map(|m| m.slot);
    let definition = params.platform.node_definition();

    let mut connector = Node::new(0, CONNECTOR_LABEL, Role::ExternalConnector, CONNECTOR_DEFINITION);
    connector.placement = Placement::Spiral { index: 0 };
    connector
        .interfaces
        .push(Interface::physical(0, InterfaceRole::Service, None));
    let connector = plan.add_node(connector);

    let mut dns = Node::new(0, DNS_HOST_LABEL, Role::DnsHost, DNS_HOST_DEFINITION);
    dns.placement = Placement::Spiral { index: 1 };
    dns.interfaces
        .push(Interface::physical(0, InterfaceRole::Service, None));
    let dns = plan.add_node(dns);
    plan.connect((dns, 0), (connector, 0));

    let first_router = plan.nodes.len();
    for n in 1..=params.nodes {
        let mut node = Node::new(n, format!("R{n}"), Role::Router, definition);
        node.loopback = Some(addresses.loopback.host(n)?);
        node.placement = Placement::Spiral { index: n + 1 };
        plan.add_node(node);
    }
    let index_of = |ordinal: u32| first_router + ordinal as usize - 1;

    for &(a, b) in edges {
        let (a_addr, b_addr) = addresses.pair.link(plan.next_link_ordinal())?;
        let (a_idx, b_idx) = (index_of(a), index_of(b));
        let a_slot = plan.nodes[a_idx].next_free_slot(reserved);
        let b_slot = plan.nodes[b_idx].next_free_slot(reserved);
        plan.nodes[a_idx]
            .interfaces
            .push(Interface::physical(a_slot, InterfaceRole::Mesh, Some(a_addr)));
        plan.nodes[b_idx]
            .interfaces
            .push(Interface::physical(b_slot, InterfaceRole::Mesh, Some(b_addr)));
        plan.connect((a_idx, a_slot), (b_idx, b_slot));
        debug!("R{a} slot {a_slot} <-> R{b} slot {b_slot} ({a_addr})");
    }

    let core_ordinal = core_ordinal(params.nodes, edges);
    let core = index_of(core_ordinal);
    let (dns_addr, core_addr) = addresses.pair.link(plan.next_link_ordinal())?;
    plan.nodes[dns]
        .interfaces
        .push(Interface::physical(1, InterfaceRole::Service, Some(dns_addr)));
    let core_slot = plan.nodes[core].next_free_slot(reserved);
    plan.nodes[core]
        .interfaces
        .push(Interface::physical(core_slot, InterfaceRole::Service, Some(core_addr)));
    plan.connect((dns, 1), (core, core_slot));
    plan.core_router = Some(core);

    info!(
        "Partial mesh: {} routers, {} links, core R{}",
        params.nodes,
        edges.len(),
        core_ordinal
    );
    Ok(core)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::params::Shape;

    fn mesh_plan(nodes: u32) -> (TopologyPlan, Vec<(u32, u32)>) {
        let params = GenerationParams::new(Shape::PartialMesh, nodes);
        let addresses = AddressPlan::new(&params, &Config::default());
        let edges = draw_edges(nodes, params.mesh.as_ref().unwrap());
        let mut plan = TopologyPlan::new(Shape::PartialMesh);
        build(&mut plan, &params, &addresses, &edges).unwrap();
        (plan, edges)
    }

    #[test]
    fn test_edges_are_deterministic_per_seed() {
        let mesh = MeshParams::default();
        assert_eq!(draw_edges(30, &mesh), draw_edges(30, &mesh));
    }

    #[test]
    fn test_chain_keeps_graph_connected_and_degree_bounded() {
        let mesh = MeshParams {
            chord_probability: 1.0,
            ..MeshParams::default()
        };
        let edges = draw_edges(40, &mesh);
        for n in 1..40 {
            assert!(edges.contains(&(n, n + 1)));
        }
        let mut degree = vec![0u32; 41];
        for (a, b) in &edges {
            assert!(a < b);
            degree[*a as usize] += 1;
            degree[*b as usize] += 1;
        }
        assert!(degree.iter().all(|&d| d <= mesh.max_degree));
        let unique: HashSet<_> = edges.iter().collect();
        assert_eq!(unique.len(), edges.len());
    }

    #[test]
    fn test_core_prefers_lowest_ordinal_on_tie() {
        assert_eq!(core_ordinal(3, &[(1, 2), (2, 3)]), 2);
        assert_eq!(core_ordinal(4, &[(1, 2), (3, 4)]), 1);
    }

    #[test]
    fn test_dns_host_hangs_off_core() {
        let (plan, edges) = mesh_plan(12);
        let core = plan.core_router.unwrap();
        let dns = plan.node_by_label(DNS_HOST_LABEL).unwrap();
        assert_eq!(dns.interface(1).unwrap().address.unwrap().prefix, 30);
        assert_eq!(plan.carved_links as usize, edges.len() + 1);
        assert!(plan.nodes[core]
            .interfaces
            .iter()
            .any(|i| i.role == InterfaceRole::Service));
        assert_eq!(plan.links.len(), edges.len() + 2);
    }
}
