//! Deterministic address allocation.
//!
//! Every address in a lab is a pure function of a pool and an ordinal:
//! router `n` gets `network + n` from each sequential pool, point-to-point
//! link `k` gets the `k`-th /30 carved from the pair pool, and the
//! certificate authority gets the last usable address of each pool that
//! reserves one. Nothing is tracked between calls, so the same parameters
//! always produce the same plan.

use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::config::Config;
use crate::error::CapacityError;
use crate::ip::net::{Cidr, IfaceAddr};
use crate::params::{GenerationParams, Shape};

/// Label used for the reserved CA addresses in error messages.
const RESERVED_OWNER: &str = "the certificate authority";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolKind {
    Underlay,
    Loopback,
    Overlay,
    PairLink,
    Management,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolKind::Underlay => "underlay",
            PoolKind::Loopback => "loopback",
            PoolKind::Overlay => "overlay tunnel",
            PoolKind::PairLink => "point-to-point",
            PoolKind::Management => "management",
        };
        f.write_str(name)
    }
}

/// One address pool and the mask its addresses carry on interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pool {
    pub kind: PoolKind,
    pub cidr: Cidr,
    pub host_prefix: u8,
    /// The last usable address is held back for the CA.
    pub reserves_last: bool,
}

impl Pool {
    fn sequential(kind: PoolKind, cidr: Cidr, host_prefix: u8, reserves_last: bool) -> Self {
        Pool {
            kind,
            cidr,
            host_prefix,
            reserves_last,
        }
    }

    /// Highest ordinal available to sequential allocation.
    pub fn max_ordinal(&self) -> u64 {
        let usable = self.cidr.usable_hosts();
        if self.reserves_last {
            usable.saturating_sub(1)
        } else {
            usable
        }
    }

    /// Address of router `ordinal` (1-based).
    pub fn host(&self, ordinal: u32) -> Result<IfaceAddr, CapacityError> {
        let ordinal = u64::from(ordinal);
        if ordinal == 0 || ordinal > self.max_ordinal() {
            return Err(CapacityError::OrdinalOutOfPool {
                pool: self.kind,
                cidr: self.cidr,
                ordinal,
            });
        }
        self.cidr
            .nth(ordinal)
            .map(|address| IfaceAddr::new(address, self.host_prefix))
            .ok_or(CapacityError::OrdinalOutOfPool {
                pool: self.kind,
                cidr: self.cidr,
                ordinal,
            })
    }

    /// The reserved singleton address.
    pub fn reserved(&self) -> IfaceAddr {
        IfaceAddr::new(self.cidr.last_usable(), self.host_prefix)
    }

    /// Both ends of point-to-point link `ordinal` (1-based).
    pub fn link(&self, ordinal: u32) -> Result<(IfaceAddr, IfaceAddr), CapacityError> {
        let out_of_pool = || CapacityError::OrdinalOutOfPool {
            pool: self.kind,
            cidr: self.cidr,
            ordinal: u64::from(ordinal),
        };
        if ordinal == 0 {
            return Err(out_of_pool());
        }
        let subnet = self
            .cidr
            .subnet(self.host_prefix, u64::from(ordinal - 1))
            .ok_or_else(out_of_pool)?;
        let first = subnet.nth(1).ok_or_else(out_of_pool)?;
        let second = subnet.nth(2).ok_or_else(out_of_pool)?;
        Ok((
            IfaceAddr::new(first, self.host_prefix),
            IfaceAddr::new(second, self.host_prefix),
        ))
    }

    /// Number of links the pool can carve.
    pub fn link_capacity(&self) -> u64 {
        1u64 << (self.host_prefix.saturating_sub(self.cidr.prefix()))
    }
}

/// What a lab will ask of the pools, computed before any node exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolDemand {
    /// Highest router ordinal.
    pub routers: u32,
    /// Point-to-point links carved from the pair pool.
    pub links: u32,
    /// Whether the reserved CA addresses are used.
    pub certificate_authority: bool,
}

/// The pools in use for one lab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPlan {
    pub underlay: Option<Pool>,
    pub loopback: Pool,
    pub overlay: Option<Pool>,
    pub pair: Pool,
    pub management: Option<Pool>,
    pub management_gateway: Option<Ipv4Addr>,
}

impl AddressPlan {
    /// Select pools for the given parameters.
    pub fn new(params: &GenerationParams, config: &Config) -> Self {
        let loopback = if params.addressing.loopback_255 {
            Cidr::from_octets([10, 255, 0, 0], 16)
        } else {
            Cidr::from_octets([10, 20, 0, 0], 16)
        };

        let underlay = match (params.shape, &params.overlay) {
            (Shape::PartialMesh, _) => None,
            (Shape::HubOverlay, Some(overlay)) => Some(overlay.nbma),
            _ if params.addressing.gi0_zero => Some(Cidr::from_octets([10, 0, 0, 0], 16)),
            _ => Some(Cidr::from_octets([10, 10, 0, 0], 16)),
        };

        let overlay = params
            .overlay
            .as_ref()
            .filter(|_| params.shape == Shape::HubOverlay)
            .map(|o| Pool::sequential(PoolKind::Overlay, o.tunnel, o.tunnel.prefix(), false));

        let management = params.management.as_ref().map(|m| {
            Pool::sequential(PoolKind::Management, m.cidr, m.cidr.prefix(), true)
        });

        AddressPlan {
            underlay: underlay
                .map(|cidr| Pool::sequential(PoolKind::Underlay, cidr, cidr.prefix(), true)),
            loopback: Pool::sequential(PoolKind::Loopback, loopback, 32, true),
            overlay,
            pair: Pool::sequential(PoolKind::PairLink, config.p2pnets, 30, false),
            management,
            management_gateway: params.management.as_ref().and_then(|m| m.gateway),
        }
    }

    /// Look up a pool that must be in use.
    pub fn pool(&self, kind: PoolKind) -> Result<&Pool, CapacityError> {
        let pool = match kind {
            PoolKind::Underlay => self.underlay.as_ref(),
            PoolKind::Loopback => Some(&self.loopback),
            PoolKind::Overlay => self.overlay.as_ref(),
            PoolKind::PairLink => Some(&self.pair),
            PoolKind::Management => self.management.as_ref(),
        };
        pool.ok_or(CapacityError::PoolNotConfigured { pool: kind })
    }

    /// Check every pool against the demand before anything is allocated.
    pub fn validate(&self, demand: &PoolDemand) -> Result<(), CapacityError> {
        let sequential = [
            self.underlay.as_ref(),
            Some(&self.loopback),
            self.overlay.as_ref(),
            self.management.as_ref(),
        ];
        for pool in sequential.into_iter().flatten() {
            let reserved = u64::from(pool.reserves_last && demand.certificate_authority);
            let required = u64::from(demand.routers) + reserved;
            let available = pool.cidr.usable_hosts();
            if u64::from(demand.routers) > pool.max_ordinal() {
                return Err(CapacityError::PoolExhausted {
                    pool: pool.kind,
                    cidr: pool.cidr,
                    required,
                    available,
                });
            }
        }

        let links = u64::from(demand.links);
        if links > self.pair.link_capacity() {
            return Err(CapacityError::PoolExhausted {
                pool: PoolKind::PairLink,
                cidr: self.pair.cidr,
                required: links * 4,
                available: self.pair.cidr.size(),
            });
        }

        if let (Some(gateway), Some(mgmt)) = (self.management_gateway, self.management.as_ref()) {
            let offset = u64::from(u32::from(gateway).wrapping_sub(u32::from(mgmt.cidr.network())));
            if (1..=u64::from(demand.routers)).contains(&offset) {
                return Err(CapacityError::GatewayCollision {
                    gateway,
                    owner: format!("R{offset}"),
                });
            }
            if demand.certificate_authority && gateway == mgmt.reserved().address {
                return Err(CapacityError::GatewayCollision {
                    gateway,
                    owner: RESERVED_OWNER.to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ManagementParams, OverlayParams};

    fn plan_for(params: &GenerationParams) -> AddressPlan {
        AddressPlan::new(params, &Config::default())
    }

    #[test]
    fn test_star_addresses_encode_ordinal() {
        let params = GenerationParams::new(Shape::Star, 300);
        let plan = plan_for(&params);
        let underlay = plan.pool(PoolKind::Underlay).unwrap();
        assert_eq!(underlay.host(1).unwrap().to_string(), "10.10.0.1/16");
        assert_eq!(underlay.host(300).unwrap().to_string(), "10.10.1.44/16");
        assert_eq!(plan.loopback.host(300).unwrap().to_string(), "10.20.1.44/32");
    }

    #[test]
    fn test_address_variants() {
        let mut params = GenerationParams::new(Shape::Star, 4);
        params.addressing.gi0_zero = true;
        params.addressing.loopback_255 = true;
        let plan = plan_for(&params);
        assert_eq!(plan.pool(PoolKind::Underlay).unwrap().host(2).unwrap().to_string(), "10.0.0.2/16");
        assert_eq!(plan.loopback.host(2).unwrap().to_string(), "10.255.0.2/32");
    }

    #[test]
    fn test_reserved_is_last_usable_and_never_sequential() {
        let params = GenerationParams::new(Shape::Star, 1000);
        let plan = plan_for(&params);
        let underlay = plan.pool(PoolKind::Underlay).unwrap();
        assert_eq!(underlay.reserved().to_string(), "10.10.255.254/16");
        assert_eq!(plan.loopback.reserved().to_string(), "10.20.255.254/32");
        let reserved = underlay.reserved().address;
        assert!((1..=1000).all(|n| underlay.host(n).unwrap().address != reserved));
        assert!(underlay.host(65533).is_ok());
        assert!(underlay.host(65534).is_err());
    }

    #[test]
    fn test_pair_links_carve_slash_30() {
        let plan = plan_for(&GenerationParams::new(Shape::PairedStar, 4));
        let (a, b) = plan.pair.link(1).unwrap();
        assert_eq!(a.to_string(), "172.16.0.1/30");
        assert_eq!(b.to_string(), "172.16.0.2/30");
        let (a, _) = plan.pair.link(2).unwrap();
        assert_eq!(a.to_string(), "172.16.0.5/30");
        assert!(plan.pair.link(0).is_err());
    }

    #[test]
    fn test_narrow_pool_rejected_before_allocation() {
        let mut params = GenerationParams::new(Shape::HubOverlay, 300);
        params.overlay = Some(OverlayParams {
            nbma: "10.10.0.0/24".parse().unwrap(),
            ..OverlayParams::default()
        });
        let plan = plan_for(&params);
        let demand = PoolDemand {
            routers: 300,
            links: 0,
            certificate_authority: false,
        };
        match plan.validate(&demand) {
            Err(CapacityError::PoolExhausted { pool, required, available, .. }) => {
                assert_eq!(pool, PoolKind::Underlay);
                assert_eq!(required, 300);
                assert_eq!(available, 254);
            }
            other => panic!("expected pool exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_reserved_singleton_counts_against_capacity() {
        let mut params = GenerationParams::new(Shape::HubOverlay, 254);
        params.overlay = Some(OverlayParams {
            nbma: "10.10.0.0/24".parse().unwrap(),
            tunnel: "172.20.0.0/24".parse().unwrap(),
            ..OverlayParams::default()
        });
        let plan = plan_for(&params);
        let mut demand = PoolDemand {
            routers: 253,
            links: 0,
            certificate_authority: false,
        };
        assert!(plan.validate(&demand).is_ok());
        demand.routers = 254;
        assert!(plan.validate(&demand).is_err());
    }

    #[test]
    fn test_gateway_collision_detected() {
        let mut params = GenerationParams::new(Shape::Star, 10);
        params.management = Some(ManagementParams {
            gateway: Some("10.254.0.5".parse().unwrap()),
            ..ManagementParams::default()
        });
        let plan = plan_for(&params);
        let demand = PoolDemand {
            routers: 10,
            links: 0,
            certificate_authority: true,
        };
        match plan.validate(&demand) {
            Err(CapacityError::GatewayCollision { owner, .. }) => assert_eq!(owner, "R5"),
            other => panic!("expected gateway collision, got {other:?}"),
        }
    }

    #[test]
    fn test_mesh_has_no_underlay_pool() {
        let plan = plan_for(&GenerationParams::new(Shape::PartialMesh, 10));
        assert!(plan.underlay.is_none());
        assert!(matches!(
            plan.pool(PoolKind::Underlay),
            Err(CapacityError::PoolNotConfigured { pool: PoolKind::Underlay })
        ));
    }
}
