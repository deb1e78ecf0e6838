//! Address allocation.
//!
//! This module maps router ordinals onto deterministic IPv4 addresses and
//! keeps the registry used to prove addresses are unique across a plan.

pub mod allocator;
pub mod net;
pub mod registry;

// Re-export commonly used types
pub use allocator::{AddressPlan, Pool, PoolDemand, PoolKind};
pub use net::{Cidr, CidrError, IfaceAddr};
pub use registry::AddressRegistry;
