//! Capacity and layout planner.
//!
//! Runs after the builder and before synthesis. Checks the finished graph
//! against the platform ceilings, proves slot and address uniqueness, and
//! turns every placement hint into canvas coordinates. The coordinate
//! clamp lives only here, so no shape can push a node off the canvas.

use std::collections::HashSet;

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::CapacityError;
use crate::ip::AddressRegistry;
use crate::params::GenerationParams;
use crate::topology::{Placement, Point, TopologyPlan};

/// What the planner measured and decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityReport {
    pub routers: u32,
    pub nodes: usize,
    pub switches: usize,
    pub links: usize,
    /// Busiest switch port count.
    pub max_ports: u32,
    pub addresses: usize,
    pub column_step: i64,
    pub row_step: i64,
    pub spiral_step: i64,
}

/// Validate `plan` and assign every node and switch its position.
pub fn plan(plan: &mut TopologyPlan, params: &GenerationParams) -> Result<CapacityReport, CapacityError> {
    let limits = &params.limits;

    let routers = plan.router_count();
    if routers > limits.max_nodes {
        if !params.allow_oversubscribe {
            return Err(CapacityError::NodeCeiling {
                nodes: routers,
                ceiling: limits.max_nodes,
            });
        }
        warn!(
            "{} routers exceed the recommended ceiling of {}; continuing because oversubscription is allowed",
            routers, limits.max_nodes
        );
    }

    let mut max_ports = 0;
    for switch in &plan.switches {
        let ports = switch.port_count();
        if ports > limits.switch_ports {
            return Err(CapacityError::PortCeiling {
                switch: switch.label.clone(),
                ports,
                ceiling: limits.switch_ports,
            });
        }
        max_ports = max_ports.max(ports);
    }

    check_slots(plan)?;
    let registry = register_addresses(plan, params)?;

    let steps = Steps::compute(plan, params)?;
    for node in &mut plan.nodes {
        node.position = steps.position(node.placement);
    }
    for switch in &mut plan.switches {
        switch.position = steps.position(switch.placement);
    }

    let report = CapacityReport {
        routers,
        nodes: plan.nodes.len(),
        switches: plan.switches.len(),
        links: plan.links.len(),
        max_ports,
        addresses: registry.count(),
        column_step: steps.column,
        row_step: steps.row,
        spiral_step: steps.spiral,
    };
    info!(
        "Capacity check passed: {} routers, {} switches (max {} ports), {} addresses",
        report.routers, report.switches, report.max_ports, report.addresses
    );
    Ok(report)
}

fn check_slots(plan: &TopologyPlan) -> Result<(), CapacityError> {
    for node in &plan.nodes {
        let mut slots = HashSet::new();
        for iface in &node.interfaces {
            if !slots.insert(iface.slot) {
                return Err(CapacityError::DuplicateSlot {
                    owner: node.label.clone(),
                    slot: iface.slot,
                });
            }
        }
    }
    Ok(())
}

fn register_addresses(
    plan: &TopologyPlan,
    params: &GenerationParams,
) -> Result<AddressRegistry, CapacityError> {
    let mut registry = AddressRegistry::new();
    for node in &plan.nodes {
        if let Some(loopback) = node.loopback {
            registry.register(loopback.address, &format!("{} Loopback0", node.label))?;
        }
        for iface in &node.interfaces {
            if let Some(addr) = iface.address {
                let owner = format!(
                    "{} {}",
                    node.label,
                    node.interface_label(params.platform, iface.slot)
                );
                registry.register(addr.address, &owner)?;
            }
        }
    }
    if let Some(gateway) = params.management.as_ref().and_then(|m| m.gateway) {
        if let Some(owner) = registry.owner_of(gateway) {
            return Err(CapacityError::GatewayCollision {
                gateway,
                owner: owner.to_string(),
            });
        }
        registry.register(gateway, "management gateway")?;
    }
    debug!("{} addresses registered", registry.count());
    Ok(registry)
}

/// Canvas spacing after clamping.
#[derive(Debug, Clone, Copy)]
struct Steps {
    column: i64,
    row: i64,
    spiral: i64,
}

impl Steps {
    fn compute(plan: &TopologyPlan, params: &GenerationParams) -> Result<Self, CapacityError> {
        let distance = i64::from(params.distance);

        // furthest extent in each direction, with the resource that reaches it
        let mut column = (0i64, String::new());
        let mut row = (0i64, String::new());
        let mut spiral = (0i64, String::new());
        let placements = plan
            .nodes
            .iter()
            .map(|n| (n.placement, &n.label))
            .chain(plan.switches.iter().map(|s| (s.placement, &s.label)));
        for (placement, label) in placements {
            match placement {
                Placement::Grid { column: c, row: r } => {
                    if i64::from(c).abs() > column.0 {
                        column = (i64::from(c).abs(), label.clone());
                    }
                    if i64::from(r) > row.0 {
                        row = (i64::from(r), label.clone());
                    }
                }
                Placement::Spiral { index } => {
                    let (x, y) = spiral_cell(index);
                    let extent = x.abs().max(y.abs());
                    if extent > spiral.0 {
                        spiral = (extent, label.clone());
                    }
                }
                Placement::Unplaced => {}
            }
        }

        Ok(Steps {
            column: clamp_step(distance * 3, column, &params.limits)?,
            row: clamp_step(distance, row, &params.limits)?,
            spiral: clamp_step(distance, spiral, &params.limits)?,
        })
    }

    fn position(&self, placement: Placement) -> Point {
        match placement {
            Placement::Grid { column, row } => Point {
                x: i64::from(column) * self.column,
                y: i64::from(row) * self.row,
            },
            Placement::Spiral { index } => {
                let (x, y) = spiral_cell(index);
                Point {
                    x: x * self.spiral,
                    y: y * self.spiral,
                }
            }
            Placement::Unplaced => Point::default(),
        }
    }
}

/// Shrink `base` so `extent` cells fit inside the canvas bound.
fn clamp_step(
    base: i64,
    (extent, resource): (i64, String),
    limits: &crate::config::Limits,
) -> Result<i64, CapacityError> {
    if extent == 0 {
        return Ok(base);
    }
    let bound = i64::from(limits.max_coordinate);
    let step = base.min(bound / extent);
    if step < base && step < i64::from(limits.min_spacing) {
        return Err(CapacityError::Coordinate {
            resource,
            projected: base * extent,
            bound,
            min_spacing: limits.min_spacing,
        });
    }
    if step < base {
        debug!("spacing {base} clamped to {step} for {extent} cells");
    }
    Ok(step)
}

/// Cell of `index` on a square spiral around the origin: right, down,
/// left, up, with leg lengths 1, 1, 2, 2, 3, 3, ...
pub fn spiral_cell(index: u32) -> (i64, i64) {
    const DIRECTIONS: [(i64, i64); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];
    let (mut x, mut y) = (0i64, 0i64);
    let mut remaining = i64::from(index);
    let mut leg = 1i64;
    let mut direction = 0;
    while remaining > 0 {
        for _ in 0..2 {
            let step = leg.min(remaining);
            let (dx, dy) = DIRECTIONS[direction];
            x += dx * step;
            y += dy * step;
            remaining -= step;
            direction = (direction + 1) % 4;
            if remaining == 0 {
                break;
            }
        }
        leg += 1;
    }
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ip::{AddressPlan, IfaceAddr};
    use crate::params::Shape;
    use crate::topology::{self, Fabric, Interface, InterfaceRole, Tier};

    fn built(params: &GenerationParams) -> TopologyPlan {
        let addresses = AddressPlan::new(params, &Config::default());
        topology::build(params, &addresses).unwrap()
    }

    #[test]
    fn test_spiral_cells() {
        assert_eq!(spiral_cell(0), (0, 0));
        assert_eq!(spiral_cell(1), (1, 0));
        assert_eq!(spiral_cell(2), (1, 1));
        assert_eq!(spiral_cell(3), (0, 1));
        assert_eq!(spiral_cell(4), (-1, 1));
        assert_eq!(spiral_cell(5), (-1, 0));
        assert_eq!(spiral_cell(6), (-1, -1));
        assert_eq!(spiral_cell(9), (2, -1));
    }

    #[test]
    fn test_star_314_fits_default_ceilings() {
        let params = GenerationParams::new(Shape::Star, 314);
        let mut lab = built(&params);
        let report = plan(&mut lab, &params).unwrap();
        assert_eq!(lab.switches_in(Fabric::Data, Tier::Access).count(), 16);
        assert_eq!(lab.switches.iter().find(|s| s.label == "SW0").unwrap().port_count(), 16);
        assert!(report.max_ports <= params.limits.switch_ports);
        assert_eq!(report.addresses, 314 * 2);
    }

    #[test]
    fn test_router_ceiling_and_oversubscribe() {
        let mut params = GenerationParams::new(Shape::Star, 600);
        params.group_size = 30;
        let mut lab = built(&params);
        assert!(matches!(
            plan(&mut lab, &params),
            Err(CapacityError::NodeCeiling { nodes: 600, ceiling: 520 })
        ));
        params.allow_oversubscribe = true;
        assert!(plan(&mut lab, &params).is_ok());
    }

    #[test]
    fn test_port_ceiling_names_switch() {
        let mut params = GenerationParams::new(Shape::Star, 40);
        params.group_size = 40;
        let mut lab = built(&params);
        match plan(&mut lab, &params) {
            Err(CapacityError::PortCeiling { switch, ports, .. }) => {
                assert_eq!(switch, "SW1");
                assert_eq!(ports, 41);
            }
            other => panic!("expected port ceiling, got {other:?}"),
        }
    }

    #[test]
    fn test_huge_switch_count_fails_on_coordinates() {
        let mut params = GenerationParams::new(Shape::Star, 1000);
        params.group_size = 1;
        params.allow_oversubscribe = true;
        params.limits.switch_ports = 2000;
        let mut lab = built(&params);
        match plan(&mut lab, &params) {
            Err(CapacityError::Coordinate { resource, projected, bound, .. }) => {
                assert_eq!(resource, "R1000");
                assert_eq!(projected, 1000 * 600);
                assert_eq!(bound, 15000);
            }
            other => panic!("expected coordinate error, got {other:?}"),
        }
    }

    #[test]
    fn test_coordinates_clamped_inside_canvas() {
        let mut params = GenerationParams::new(Shape::Star, 500);
        params.group_size = 5;
        params.limits.switch_ports = 200;
        let mut lab = built(&params);
        let report = plan(&mut lab, &params).unwrap();
        assert!(report.column_step < 600);
        let bound = i64::from(params.limits.max_coordinate);
        assert!(lab.nodes.iter().all(|n| n.position.x.abs() <= bound && n.position.y.abs() <= bound));
        assert!(lab.switches.iter().all(|s| s.position.x.abs() <= bound));
    }

    #[test]
    fn test_mesh_positions_follow_spiral() {
        let params = GenerationParams::new(Shape::PartialMesh, 10);
        let mut lab = built(&params);
        let report = plan(&mut lab, &params).unwrap();
        assert_eq!(report.spiral_step, 200);
        let r1 = lab.node_by_label("R1").unwrap();
        assert_eq!(r1.position, Point { x: 200, y: 200 });
    }

    #[test]
    fn test_duplicate_address_detected() {
        let params = GenerationParams::new(Shape::Star, 4);
        let mut lab = built(&params);
        let clash: IfaceAddr = lab.nodes[0].interface(0).unwrap().address.unwrap();
        lab.nodes[1]
            .interfaces
            .push(Interface::physical(3, InterfaceRole::Service, Some(clash)));
        assert!(matches!(
            plan(&mut lab, &params),
            Err(CapacityError::DuplicateAddress { .. })
        ));
    }
}
