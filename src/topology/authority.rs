//! Certificate authority injection.
//!
//! The CA is a singleton router with ordinal 0. It takes the reserved last
//! address of every pool that holds one back, so its addresses never
//! depend on the router count.

use log::info;

use crate::error::CapacityError;
use crate::ip::{AddressPlan, PoolKind};
use crate::params::{GenerationParams, PkiParams};
use crate::topology::types::{
    Interface, InterfaceRole, Node, NodeIndex, Placement, Role, SwitchIndex, TopologyPlan,
};

/// Where the CA plugs into the data plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Slot 0 on the next free port of the core data switch.
    Switch(SwitchIndex),
    /// A point-to-point link to a router.
    Router(NodeIndex),
}

pub fn inject(
    plan: &mut TopologyPlan,
    params: &GenerationParams,
    pki: &PkiParams,
    addresses: &AddressPlan,
    attachment: Attachment,
) -> Result<NodeIndex, CapacityError> {
    let mut ca = Node::new(
        0,
        pki.ca_name.clone(),
        Role::CertificateAuthority,
        params.platform.node_definition(),
    );
    ca.loopback = Some(addresses.loopback.reserved());

    let ca_idx = match attachment {
        Attachment::Switch(core) => {
            let uplink = addresses.pool(PoolKind::Underlay)?.reserved();
            ca.interfaces
                .push(Interface::physical(0, InterfaceRole::Uplink, Some(uplink)));
            ca.placement = Placement::Grid { column: 0, row: 1 };
            let idx = plan.add_node(ca);
            let port = plan.attach_to_switch(idx, 0, core);
            info!(
                "Certificate authority {} on {} port {} ({})",
                pki.ca_name, plan.switches[core].label, port, uplink
            );
            idx
        }
        Attachment::Router(router) => {
            let (ca_addr, router_addr) = addresses.pair.link(plan.next_link_ordinal())?;
            ca.interfaces
                .push(Interface::physical(0, InterfaceRole::Service, Some(ca_addr)));
            ca.placement = Placement::Spiral {
                index: params.nodes + 2,
            };
            let idx = plan.add_node(ca);
            let reserved = params.management.as_ref().map(|m| m.slot);
            let slot = plan.nodes[router].next_free_slot(reserved);
            plan.nodes[router]
                .interfaces
                .push(Interface::physical(slot, InterfaceRole::Service, Some(router_addr)));
            plan.connect((idx, 0), (router, slot));
            info!(
                "Certificate authority {} linked to {} ({})",
                pki.ca_name, plan.nodes[router].label, ca_addr
            );
            idx
        }
    };
    Ok(ca_idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::params::Shape;
    use crate::topology::star;

    #[test]
    fn test_ca_takes_reserved_addresses_on_core() {
        let config = Config::default();
        let mut params = GenerationParams::new(Shape::Star, 1000);
        params.pki = Some(PkiParams::from_config(&config));
        let addresses = AddressPlan::new(&params, &config);
        let mut plan = TopologyPlan::new(Shape::Star);
        let layout = star::build(&mut plan, &params, &addresses, |_| Role::Router, "SW").unwrap();

        let pki = params.pki.clone().unwrap();
        let ca = inject(&mut plan, &params, &pki, &addresses, Attachment::Switch(layout.core)).unwrap();
        let node = &plan.nodes[ca];
        assert_eq!(node.label, "CA-ROOT");
        assert_eq!(node.ordinal, 0);
        assert_eq!(node.interface(0).unwrap().address.unwrap().to_string(), "10.10.255.254/16");
        assert_eq!(node.loopback.unwrap().to_string(), "10.20.255.254/32");
        assert_eq!(plan.switches[layout.core].port_count(), layout.access.len() as u32 + 1);
        assert_eq!(plan.router_count(), 1000);
    }
}
