//! Out-of-band management fabric, shared by every shape.

use log::info;

use crate::error::CapacityError;
use crate::ip::{AddressPlan, PoolKind};
use crate::params::ManagementParams;
use crate::topology::fabric::{self, FabricLayout, FabricSpec};
use crate::topology::types::{Fabric, Interface, InterfaceRole, NodeIndex, Role, TopologyPlan};

const FABRIC_PREFIX: &str = "SWoob";

/// Give every router (and the CA, if present) an addressed management
/// interface on `mgmt.slot` and attach it to the `SWoob` fabric.
pub fn attach(
    plan: &mut TopologyPlan,
    mgmt: &ManagementParams,
    group_size: u32,
    addresses: &AddressPlan,
) -> Result<FabricLayout, CapacityError> {
    let pool = addresses.pool(PoolKind::Management)?;

    let mut members = Vec::new();
    let mut authority: Option<NodeIndex> = None;
    for (idx, node) in plan.nodes.iter_mut().enumerate() {
        let address = match node.role {
            Role::CertificateAuthority => {
                authority = Some(idx);
                pool.reserved()
            }
            role if role.is_router() => {
                members.push((idx, mgmt.slot));
                pool.host(node.ordinal)?
            }
            _ => continue,
        };
        node.interfaces.push(
            Interface::physical(mgmt.slot, InterfaceRole::Management, Some(address))
                .with_vrf(mgmt.vrf.clone()),
        );
    }

    let spec = FabricSpec {
        fabric: Fabric::Management,
        prefix: FABRIC_PREFIX,
        group_size,
        rows_per_member: 1,
    };
    let layout = fabric::build(plan, &spec, &members);
    if let Some(ca) = authority {
        plan.attach_to_switch(ca, mgmt.slot, layout.core);
    }

    info!(
        "Management fabric: {} access switches, {} attachments",
        layout.access.len(),
        members.len() + usize::from(authority.is_some())
    );
    Ok(layout)
}
