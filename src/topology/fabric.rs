//! Shared switch fabric construction.
//!
//! Every shape that hangs routers off unmanaged switches goes through here:
//! one core switch, `ceil(members / group)` access switches each uplinked
//! from port 0 to the next core port, and members attached to the next
//! free access port in order. Port numbering and placement hints live in
//! this one place for the data and management fabrics alike.

use log::debug;

use crate::topology::types::{
    Endpoint, Fabric, Link, NodeIndex, Placement, Switch, SwitchIndex, Tier, TopologyPlan,
};

/// How to build one fabric.
#[derive(Debug, Clone, Copy)]
pub struct FabricSpec {
    pub fabric: Fabric,
    /// Switch label prefix; the core is `<prefix>0`.
    pub prefix: &'static str,
    pub group_size: u32,
    /// Grid rows each member occupies under its access switch. Paired
    /// layouts use 2 so the partner can sit directly below.
    pub rows_per_member: u32,
}

/// Switch indices of a built fabric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricLayout {
    pub core: SwitchIndex,
    pub access: Vec<SwitchIndex>,
}

impl FabricSpec {
    /// Grid column for fabric position `position` (0 = core).
    fn column(&self, position: usize) -> i32 {
        match self.fabric {
            Fabric::Data => position as i32,
            Fabric::Management => -(position as i32) - 1,
        }
    }
}

/// Build the fabric and attach `members` (node, slot) in order.
///
/// Data fabric members also receive their grid placement; management
/// members keep the placement their data attachment gave them.
pub fn build(plan: &mut TopologyPlan, spec: &FabricSpec, members: &[(NodeIndex, u32)]) -> FabricLayout {
    let group = spec.group_size.max(1) as usize;
    let access_count = members.len().div_ceil(group);

    let mut core_switch = Switch::new(format!("{}0", spec.prefix), spec.fabric, Tier::Core);
    core_switch.placement = Placement::Grid {
        column: spec.column(0),
        row: 0,
    };
    let core = plan.add_switch(core_switch);

    let mut access = Vec::with_capacity(access_count);
    for i in 0..access_count {
        let mut switch = Switch::new(format!("{}{}", spec.prefix, i + 1), spec.fabric, Tier::Access);
        switch.placement = Placement::Grid {
            column: spec.column(i + 1),
            row: 0,
        };
        let sw = plan.add_switch(switch);
        uplink(plan, sw, core);
        access.push(sw);
    }

    for (k, &(node, slot)) in members.iter().enumerate() {
        let column = k / group;
        let sw = access[column];
        let port = plan.attach_to_switch(node, slot, sw);
        debug!(
            "{} slot {} -> {} port {}",
            plan.nodes[node].label, slot, plan.switches[sw].label, port
        );
        if spec.fabric == Fabric::Data {
            plan.nodes[node].placement = Placement::Grid {
                column: spec.column(column + 1),
                row: (k % group) as u32 * spec.rows_per_member + 1,
            };
        }
    }

    FabricLayout { core, access }
}

/// Access port 0 to the next core port.
fn uplink(plan: &mut TopologyPlan, access: SwitchIndex, core: SwitchIndex) {
    let core_port = plan.switches[core].port_count();
    let access_port = plan.switches[access].attach(Endpoint::Switch {
        switch: core,
        port: core_port,
    });
    plan.switches[core].attach(Endpoint::Switch {
        switch: access,
        port: access_port,
    });
    plan.links.push(Link {
        a: Endpoint::Switch {
            switch: access,
            port: access_port,
        },
        b: Endpoint::Switch {
            switch: core,
            port: core_port,
        },
    });
}
