//! Star shape: routers on access switches under one core.

use log::debug;

use crate::error::CapacityError;
use crate::ip::{AddressPlan, PoolKind};
use crate::params::GenerationParams;
use crate::topology::fabric::{self, FabricLayout, FabricSpec};
use crate::topology::types::{Fabric, Interface, InterfaceRole, Node, Role, TopologyPlan};

/// Add routers `R1..RN`, each with an addressed uplink on slot 0, and hang
/// them off a data fabric named with `prefix`.
pub fn build(
    plan: &mut TopologyPlan,
    params: &GenerationParams,
    addresses: &AddressPlan,
    role_for: impl Fn(u32) -> Role,
    prefix: &'static str,
) -> Result<FabricLayout, CapacityError> {
    let underlay = addresses.pool(PoolKind::Underlay)?;
    let mut members = Vec::with_capacity(params.nodes as usize);

    for n in 1..=params.nodes {
        let mut node = Node::new(n, format!("R{n}"), role_for(n), params.platform.node_definition());
        node.loopback = Some(addresses.loopback.host(n)?);
        let uplink = underlay.host(n)?;
        debug!("R{n} uplink {uplink}");
        node.interfaces
            .push(Interface::physical(0, InterfaceRole::Uplink, Some(uplink)));
        members.push((plan.add_node(node), 0));
    }

    let spec = FabricSpec {
        fabric: Fabric::Data,
        prefix,
        group_size: params.group_size,
        rows_per_member: 1,
    };
    Ok(fabric::build(plan, &spec, &members))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::params::Shape;
    use crate::topology::types::Tier;

    #[test]
    fn test_star_314_routers_group_20() {
        let params = GenerationParams::new(Shape::Star, 314);
        let addresses = AddressPlan::new(&params, &Config::default());
        let mut plan = TopologyPlan::new(Shape::Star);
        let layout = build(&mut plan, &params, &addresses, |_| Role::Router, "SW").unwrap();

        assert_eq!(layout.access.len(), 16);
        assert_eq!(plan.switches[layout.core].port_count(), 16);
        assert_eq!(plan.switches_in(Fabric::Data, Tier::Access).count(), 16);
        assert_eq!(plan.router_count(), 314);
        let r314 = plan.node_by_label("R314").unwrap();
        assert_eq!(r314.interface(0).unwrap().address.unwrap().to_string(), "10.10.1.58/16");
        assert_eq!(r314.loopback.unwrap().to_string(), "10.20.1.58/32");
    }
}
