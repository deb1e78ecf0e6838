//! IPv4 network primitives.
//!
//! `Cidr` is a network with its prefix length, `IfaceAddr` is a host
//! address with the mask it is configured with on an interface.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors parsing or constructing a network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    #[error("'{0}' is not in a.b.c.d/len form")]
    Malformed(String),
    #[error("prefix length {0} is larger than 32")]
    Prefix(u8),
    #[error("{0} has host bits set")]
    HostBits(String),
}

/// An IPv4 network, e.g. `10.10.0.0/16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    /// Build a network, rejecting addresses with host bits set.
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, CidrError> {
        if prefix > 32 {
            return Err(CidrError::Prefix(prefix));
        }
        if u32::from(network) & !mask_bits(prefix) != 0 {
            return Err(CidrError::HostBits(format!("{network}/{prefix}")));
        }
        Ok(Cidr { network, prefix })
    }

    /// Const constructor for built-in defaults; the octets must not have
    /// host bits set for `prefix`.
    pub(crate) const fn from_octets(octets: [u8; 4], prefix: u8) -> Self {
        Cidr {
            network: Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
            prefix,
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn netmask(&self) -> Ipv4Addr {
        netmask(self.prefix)
    }

    /// Total number of addresses, network and broadcast included.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// Addresses assignable to hosts.
    pub fn usable_hosts(&self) -> u64 {
        match self.prefix {
            32 => 1,
            31 => 2,
            _ => self.size() - 2,
        }
    }

    /// `network + offset`, if it stays inside the network.
    pub fn nth(&self, offset: u64) -> Option<Ipv4Addr> {
        if offset >= self.size() {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(self.network) + offset as u32))
    }

    /// Highest address usable by a host (one below broadcast).
    pub fn last_usable(&self) -> Ipv4Addr {
        match self.prefix {
            32 => self.network,
            31 => Ipv4Addr::from(u32::from(self.network) + 1),
            _ => Ipv4Addr::from(u32::from(self.network) + (self.size() - 2) as u32),
        }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask_bits(self.prefix) == u32::from(self.network)
    }

    /// The `index`-th subnet of length `prefix` carved from this network.
    pub fn subnet(&self, prefix: u8, index: u64) -> Option<Cidr> {
        if prefix < self.prefix || prefix > 32 {
            return None;
        }
        let count = 1u64 << (prefix - self.prefix);
        if index >= count {
            return None;
        }
        let step = 1u64 << (32 - u32::from(prefix));
        let base = u64::from(u32::from(self.network)) + index * step;
        Some(Cidr {
            network: Ipv4Addr::from(base as u32),
            prefix,
        })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| CidrError::Malformed(s.to_string()))?;
        let network = addr
            .parse::<Ipv4Addr>()
            .map_err(|_| CidrError::Malformed(s.to_string()))?;
        let prefix = len
            .parse::<u8>()
            .map_err(|_| CidrError::Malformed(s.to_string()))?;
        Cidr::new(network, prefix)
    }
}

impl TryFrom<String> for Cidr {
    type Error = CidrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(value: Cidr) -> Self {
        value.to_string()
    }
}

/// A host address together with the mask configured on its interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IfaceAddr {
    pub address: Ipv4Addr,
    pub prefix: u8,
}

impl IfaceAddr {
    pub fn new(address: Ipv4Addr, prefix: u8) -> Self {
        IfaceAddr { address, prefix }
    }

    pub fn netmask(&self) -> Ipv4Addr {
        netmask(self.prefix)
    }

    /// The network this address belongs to.
    pub fn network(&self) -> Cidr {
        Cidr {
            network: Ipv4Addr::from(u32::from(self.address) & mask_bits(self.prefix)),
            prefix: self.prefix,
        }
    }
}

impl fmt::Display for IfaceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

fn mask_bits(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

/// Dotted netmask for a prefix length, e.g. 16 -> 255.255.0.0
pub fn netmask(prefix: u8) -> Ipv4Addr {
    Ipv4Addr::from(mask_bits(prefix))
}

/// Dotted wildcard (inverse) mask, as used by routing `network` statements.
pub fn wildcard(prefix: u8) -> Ipv4Addr {
    Ipv4Addr::from(!mask_bits(prefix))
}
