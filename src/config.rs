//! Tool configuration.
//!
//! Site-wide settings that rarely change between runs: credentials and
//! naming baked into every router, the point-to-point pool, capacity
//! ceilings and the certificate-authority boot timing. Loaded from YAML by
//! [`crate::config_loader`].

use std::net::Ipv4Addr;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ip::Cidr;

/// Validation errors for the tool configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid domain name '{0}'")]
    DomainName(String),
    #[error("username and password must not be empty")]
    Credentials,
    #[error("limit '{0}' must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("p2pnets {0} is too narrow to carve /30 links from")]
    PairPool(Cidr),
}

/// Top-level tool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pool carved into /30 point-to-point links.
    pub p2pnets: Cidr,
    pub nameserver: Ipv4Addr,
    pub domainname: String,
    pub username: String,
    pub password: String,
    pub limits: Limits,
    pub pki: PkiTiming,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            p2pnets: Cidr::from_octets([172, 16, 0, 0], 12),
            nameserver: Ipv4Addr::new(8, 8, 8, 8),
            domainname: "virl.lab".to_string(),
            username: "cisco".to_string(),
            password: "cisco".to_string(),
            limits: Limits::default(),
            pki: PkiTiming::default(),
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let domain = Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*$")
            .map_err(|_| ConfigError::DomainName(self.domainname.clone()))?;
        if !domain.is_match(&self.domainname) {
            return Err(ConfigError::DomainName(self.domainname.clone()));
        }
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(ConfigError::Credentials);
        }
        if self.p2pnets.prefix() > 30 {
            return Err(ConfigError::PairPool(self.p2pnets));
        }
        self.limits.validate()
    }
}

/// Platform ceilings enforced by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Recommended router ceiling, bypassed with `--allow-oversubscribe`.
    pub max_nodes: u32,
    /// Ports on an unmanaged switch.
    pub switch_ports: u32,
    /// Largest absolute x/y the controller accepts.
    pub max_coordinate: u32,
    /// Smallest spacing the layout may compress to.
    pub min_spacing: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_nodes: 520,
            switch_ports: 32,
            max_coordinate: 15000,
            min_spacing: 40,
        }
    }
}

impl Limits {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_nodes == 0 {
            return Err(ConfigError::ZeroLimit("max_nodes"));
        }
        if self.switch_ports == 0 {
            return Err(ConfigError::ZeroLimit("switch_ports"));
        }
        if self.max_coordinate == 0 {
            return Err(ConfigError::ZeroLimit("max_coordinate"));
        }
        if self.min_spacing == 0 {
            return Err(ConfigError::ZeroLimit("min_spacing"));
        }
        Ok(())
    }
}

/// Boot timing for certificate enrollment applets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PkiTiming {
    /// Countdown before the CA fixes its clock and starts the PKI server.
    #[serde(with = "humantime_serde")]
    pub ca_delay: Duration,
    /// Countdown before clients authenticate and enroll.
    #[serde(with = "humantime_serde")]
    pub client_delay: Duration,
    /// Time the CA sets when its clock is not authoritative, in
    /// `clock set` argument order.
    pub clock_anchor: String,
}

impl Default for PkiTiming {
    fn default() -> Self {
        PkiTiming {
            ca_delay: Duration::from_secs(120),
            client_delay: Duration::from_secs(240),
            clock_anchor: "00:00:00 1 January 2026".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.p2pnets.to_string(), "172.16.0.0/12");
        assert_eq!(config.nameserver, Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(config.domainname, "virl.lab");
        assert_eq!(config.limits.max_nodes, 520);
        assert_eq!(config.limits.switch_ports, 32);
        assert_eq!(config.limits.max_coordinate, 15000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
domainname: lab.example
limits:
  switch_ports: 48
pki:
  ca_delay: 90s
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.domainname, "lab.example");
        assert_eq!(config.limits.switch_ports, 48);
        assert_eq!(config.limits.max_nodes, 520);
        assert_eq!(config.pki.ca_delay, Duration::from_secs(90));
        assert_eq!(config.pki.client_delay, Duration::from_secs(240));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.domainname = "bad domain".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::DomainName(_))));

        let mut config = Config::default();
        config.password.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Credentials)));

        let mut config = Config::default();
        config.limits.switch_ports = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroLimit("switch_ports"))));
    }
}
