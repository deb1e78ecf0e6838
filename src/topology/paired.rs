//! Paired-star shape.
//!
//! Odd routers sit on the fabric and reach their even partner over a /30;
//! even routers have no fabric attachment of their own. A trailing odd
//! router keeps its pair interface unaddressed and unlinked.

use log::debug;

use crate::error::CapacityError;
use crate::ip::{AddressPlan, PoolKind};
use crate::params::GenerationParams;
use crate::topology::fabric::{self, FabricLayout, FabricSpec};
use crate::topology::types::{
    Fabric, Interface, InterfaceRole, Node, Placement, Role, TopologyPlan,
};

pub fn build(
    plan: &mut TopologyPlan,
    params: &GenerationParams,
    addresses: &AddressPlan,
    role_for: impl Fn(u32) -> Role,
    prefix: &'static str,
) -> Result<FabricLayout, CapacityError> {
    let underlay = addresses.pool(PoolKind::Underlay)?;
    let definition = params.platform.node_definition();
    let mut members = Vec::new();
    let mut pairs = Vec::new();

    for odd in (1..=params.nodes).step_by(2) {
        let even = odd + 1;
        let has_partner = even <= params.nodes;
        let link = if has_partner {
            let ordinal = plan.next_link_ordinal();
            Some(addresses.pair.link(ordinal)?)
        } else {
            None
        };

        let mut node = Node::new(odd, format!("R{odd}"), role_for(odd), definition);
        node.loopback = Some(addresses.loopback.host(odd)?);
        node.interfaces.push(Interface::physical(
            0,
            InterfaceRole::Uplink,
            Some(underlay.host(odd)?),
        ));
        node.interfaces.push(
            Interface::physical(1, InterfaceRole::PairLink, link.map(|(a, _)| a))
                .with_vrf(params.pair_vrf.clone().filter(|_| has_partner)),
        );
        let odd_idx = plan.add_node(node);
        members.push((odd_idx, 0));

        if let Some((_, even_addr)) = link {
            let mut peer = Node::new(even, format!("R{even}"), role_for(even), definition);
            peer.loopback = Some(addresses.loopback.host(even)?);
            peer.interfaces
                .push(Interface::physical(0, InterfaceRole::PairLink, Some(even_addr)));
            let even_idx = plan.add_node(peer);
            plan.connect((odd_idx, 1), (even_idx, 0));
            debug!("R{odd} slot 1 <-> R{even} slot 0 ({even_addr})");
            pairs.push((odd_idx, even_idx));
        } else {
            debug!("R{odd} has no partner; slot 1 left unaddressed");
        }
    }

    let spec = FabricSpec {
        fabric: Fabric::Data,
        prefix,
        group_size: params.group_size,
        rows_per_member: 2,
    };
    let layout = fabric::build(plan, &spec, &members);

    for (odd_idx, even_idx) in pairs {
        if let Placement::Grid { column, row } = plan.nodes[odd_idx].placement {
            plan.nodes[even_idx].placement = Placement::Grid { column, row: row + 1 };
        }
    }
    Ok(layout)
}

/// Role split used by the plain paired-star shape.
pub fn default_role(ordinal: u32) -> Role {
    if ordinal % 2 == 1 {
        Role::Router
    } else {
        Role::PairPeer
    }
}
