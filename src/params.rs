//! Generation parameters.
//!
//! `GenerationParams` is the complete, already-parsed description of one
//! lab: shape, size and every optional feature. It is built by the CLI
//! layer (or directly by tests), validated once up front, and then read by
//! every later stage without modification. It also serializes (secrets
//! excluded) into the offline document's metadata.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::config::{Config, Limits};
use crate::error::ParameterError;
use crate::ip::Cidr;

/// Smallest and largest router count a lab may have.
pub const MIN_NODES: u32 = 2;
pub const MAX_NODES: u32 = 1000;
/// Management slot used when the data plane leaves it free.
pub const DEFAULT_MANAGEMENT_SLOT: u32 = 5;

/// Topology shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    /// Core switch, access switches, one router per access port
    #[value(alias = "flat")]
    Star,
    /// Star fabric with odd/even router pairs joined by /30 links
    #[value(alias = "flat-pair")]
    PairedStar,
    /// Hub-and-spoke overlay (DMVPN) over a star or paired-star underlay
    #[value(alias = "dmvpn")]
    HubOverlay,
    /// Random partial mesh of /30 links with a DNS host
    #[value(alias = "nx")]
    PartialMesh,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::Star => "star",
            Shape::PairedStar => "paired-star",
            Shape::HubOverlay => "hub-overlay",
            Shape::PartialMesh => "partial-mesh",
        };
        f.write_str(name)
    }
}

/// Underlay beneath a hub overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Underlay {
    #[value(alias = "flat")]
    Star,
    #[value(alias = "flat-pair")]
    PairedStar,
}

/// Protection applied to overlay tunnels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OverlaySecurity {
    None,
    /// IKEv2 with a shared key
    Psk,
    /// IKEv2 with certificates from the injected CA
    Pki,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingProtocol {
    Eigrp,
    Ospf,
}

/// Router node definition. Decides interface naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    Iosv,
    Csr1000v,
    Iol,
}

impl Platform {
    /// Node definition name understood by the controller.
    pub fn node_definition(&self) -> &'static str {
        match self {
            Platform::Iosv => "iosv",
            Platform::Csr1000v => "csr1000v",
            Platform::Iol => "iol-xe",
        }
    }

    /// Interface name for a physical slot.
    pub fn interface_label(&self, slot: u32) -> String {
        match self {
            Platform::Iosv => format!("GigabitEthernet0/{slot}"),
            Platform::Csr1000v => format!("GigabitEthernet{}", slot + 1),
            Platform::Iol => format!("Ethernet{}/{}", slot / 4, slot % 4),
        }
    }
}

/// Lab document schema version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
pub enum SchemaVersion {
    #[value(name = "0.0.1")]
    #[serde(rename = "0.0.1")]
    V0_0_1,
    #[value(name = "0.0.2")]
    #[serde(rename = "0.0.2")]
    V0_0_2,
    #[value(name = "0.0.3")]
    #[serde(rename = "0.0.3")]
    V0_0_3,
    #[value(name = "0.0.4")]
    #[serde(rename = "0.0.4")]
    V0_0_4,
    #[value(name = "0.0.5")]
    #[serde(rename = "0.0.5")]
    V0_0_5,
    #[value(name = "0.1.0")]
    #[serde(rename = "0.1.0")]
    V0_1_0,
    #[value(name = "0.2.0")]
    #[serde(rename = "0.2.0")]
    V0_2_0,
    #[value(name = "0.2.1")]
    #[serde(rename = "0.2.1")]
    V0_2_1,
    #[value(name = "0.2.2")]
    #[serde(rename = "0.2.2")]
    V0_2_2,
    #[default]
    #[value(name = "0.3.0")]
    #[serde(rename = "0.3.0")]
    V0_3_0,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V0_0_1 => "0.0.1",
            SchemaVersion::V0_0_2 => "0.0.2",
            SchemaVersion::V0_0_3 => "0.0.3",
            SchemaVersion::V0_0_4 => "0.0.4",
            SchemaVersion::V0_0_5 => "0.0.5",
            SchemaVersion::V0_1_0 => "0.1.0",
            SchemaVersion::V0_2_0 => "0.2.0",
            SchemaVersion::V0_2_1 => "0.2.1",
            SchemaVersion::V0_2_2 => "0.2.2",
            SchemaVersion::V0_3_0 => "0.3.0",
        }
    }
}

/// Address variants for the star family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Addressing {
    /// Loopbacks from 10.255.0.0/16 instead of 10.20.0.0/16.
    pub loopback_255: bool,
    /// Uplinks from 10.0.0.0/16 instead of 10.10.0.0/16.
    pub gi0_zero: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayParams {
    pub underlay: Underlay,
    /// Ordinals of the routers acting as hubs.
    pub hubs: Vec<u32>,
    pub phase: u8,
    pub security: OverlaySecurity,
    #[serde(skip)]
    pub psk: Option<String>,
    pub tunnel_key: u32,
    pub nbma: Cidr,
    pub tunnel: Cidr,
    /// Configure paired peers as EIGRP stubs.
    pub eigrp_stub: bool,
}

impl Default for OverlayParams {
    fn default() -> Self {
        OverlayParams {
            underlay: Underlay::Star,
            hubs: vec![1],
            phase: 2,
            security: OverlaySecurity::None,
            psk: None,
            tunnel_key: 10,
            nbma: Cidr::from_octets([10, 10, 0, 0], 16),
            tunnel: Cidr::from_octets([172, 20, 0, 0], 16),
            eigrp_stub: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagementParams {
    pub cidr: Cidr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Ipv4Addr>,
    pub slot: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,
}

impl Default for ManagementParams {
    fn default() -> Self {
        ManagementParams {
            cidr: Cidr::from_octets([10, 254, 0, 0], 16),
            gateway: None,
            slot: DEFAULT_MANAGEMENT_SLOT,
            vrf: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NtpParams {
    pub server: Ipv4Addr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PkiParams {
    /// Trustpoint name used on every client.
    pub trustpoint: String,
    /// PKI server name on the CA.
    pub ca_name: String,
    #[serde(with = "humantime_serde")]
    pub ca_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub client_delay: Duration,
    pub clock_anchor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl PkiParams {
    /// Defaults with timing taken from the tool configuration.
    pub fn from_config(config: &Config) -> Self {
        PkiParams {
            trustpoint: "CA-ROOT-SELF".to_string(),
            ca_name: "CA-ROOT".to_string(),
            ca_delay: config.pki.ca_delay,
            client_delay: config.pki.client_delay,
            clock_anchor: config.pki.clock_anchor.clone(),
            fingerprint: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshParams {
    pub seed: u64,
    /// Chance of adding a chord from each router.
    pub chord_probability: f64,
    /// Link ceiling per router, backbone chain included.
    pub max_degree: u32,
}

impl Default for MeshParams {
    fn default() -> Self {
        MeshParams {
            seed: 1,
            chord_probability: 0.3,
            max_degree: 4,
        }
    }
}

/// Everything needed to generate one lab.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub shape: Shape,
    pub nodes: u32,
    pub lab_name: String,
    pub template: String,
    pub platform: Platform,
    pub distance: u32,
    pub group_size: u32,
    pub addressing: Addressing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_vrf: Option<String>,
    pub routing: RoutingProtocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlayParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management: Option<ManagementParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ntp: Option<NtpParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pki: Option<PkiParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshParams>,
    pub limits: Limits,
    pub allow_oversubscribe: bool,
    pub schema_version: SchemaVersion,
}

impl GenerationParams {
    /// Parameters for `shape` with `nodes` routers and every option at its
    /// default.
    pub fn new(shape: Shape, nodes: u32) -> Self {
        GenerationParams {
            shape,
            nodes,
            lab_name: "topogen lab".to_string(),
            template: "ios".to_string(),
            platform: Platform::Iosv,
            distance: 200,
            group_size: 20,
            addressing: Addressing::default(),
            pair_vrf: None,
            routing: RoutingProtocol::Eigrp,
            overlay: (shape == Shape::HubOverlay).then(OverlayParams::default),
            management: None,
            ntp: None,
            pki: None,
            mesh: (shape == Shape::PartialMesh).then(MeshParams::default),
            limits: Limits::default(),
            allow_oversubscribe: false,
            schema_version: SchemaVersion::default(),
        }
    }

    /// Whether routers come in odd/even pairs.
    pub fn is_paired(&self) -> bool {
        match self.shape {
            Shape::PairedStar => true,
            Shape::HubOverlay => self
                .overlay
                .as_ref()
                .is_some_and(|o| o.underlay == Underlay::PairedStar),
            _ => false,
        }
    }

    /// Highest interface slot the data plane may use.
    pub fn highest_data_slot(&self) -> u32 {
        match (self.shape, &self.mesh) {
            // chain and chords, plus the DNS host and CA links on the core
            (Shape::PartialMesh, Some(mesh)) => mesh.max_degree + 1,
            _ if self.is_paired() => 1,
            _ => 0,
        }
    }

    /// First management slot clear of the data plane, never below
    /// [`DEFAULT_MANAGEMENT_SLOT`].
    pub fn default_management_slot(&self) -> u32 {
        DEFAULT_MANAGEMENT_SLOT.max(self.highest_data_slot() + 1)
    }

    /// Reject contradictory or out-of-range settings before any work.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !(MIN_NODES..=MAX_NODES).contains(&self.nodes) {
            return Err(ParameterError::NodeCount {
                nodes: self.nodes,
                min: MIN_NODES,
                max: MAX_NODES,
            });
        }
        if self.group_size == 0 {
            return Err(ParameterError::ZeroGroupSize);
        }
        if self.distance == 0 {
            return Err(ParameterError::ZeroDistance);
        }
        validate_name("lab", &self.lab_name, r"^[^\r\n]{1,64}$")?;
        if crate::synth::template::lookup(&self.template).is_none() {
            return Err(ParameterError::UnknownTemplate(self.template.clone()));
        }

        match (self.shape, &self.overlay) {
            (Shape::HubOverlay, Some(overlay)) => self.validate_overlay(overlay)?,
            (Shape::HubOverlay, None) => {
                return Err(ParameterError::MissingDependency {
                    feature: "the hub-overlay shape",
                    dependency: "overlay parameters",
                })
            }
            (shape, Some(_)) => {
                return Err(ParameterError::HubsWithoutOverlay {
                    shape: shape.to_string(),
                })
            }
            _ => {}
        }

        if let Some(vrf) = &self.pair_vrf {
            if !self.is_paired() {
                return Err(ParameterError::MissingDependency {
                    feature: "a pair VRF",
                    dependency: "a paired-star layout",
                });
            }
            validate_vrf(vrf)?;
        }

        if let Some(mgmt) = &self.management {
            let reserved = self.highest_data_slot();
            if mgmt.slot <= reserved {
                return Err(ParameterError::ManagementSlot {
                    slot: mgmt.slot,
                    reserved,
                });
            }
            if let Some(gateway) = mgmt.gateway {
                if !mgmt.cidr.contains(gateway) {
                    return Err(ParameterError::GatewayOutsidePool {
                        gateway,
                        cidr: mgmt.cidr,
                    });
                }
            }
            if mgmt.cidr.prefix() > 30 {
                return Err(ParameterError::PoolTooNarrow {
                    pool: crate::ip::PoolKind::Management,
                    cidr: mgmt.cidr,
                    purpose: "a management network",
                });
            }
            if let Some(vrf) = &mgmt.vrf {
                validate_vrf(vrf)?;
            }
        }

        if let Some(ntp) = &self.ntp {
            if let Some(vrf) = &ntp.vrf {
                validate_vrf(vrf)?;
            }
        }

        if let Some(pki) = &self.pki {
            if pki.client_delay <= pki.ca_delay {
                return Err(ParameterError::DelayOrdering {
                    anchor: pki.ca_delay.as_secs(),
                    client: pki.client_delay.as_secs(),
                });
            }
            validate_name("trustpoint", &pki.trustpoint, r"^[A-Za-z][A-Za-z0-9_-]{0,63}$")?;
            validate_name("PKI server", &pki.ca_name, r"^[A-Za-z][A-Za-z0-9_-]{0,63}$")?;
            validate_name(
                "clock anchor",
                &pki.clock_anchor,
                r"^\d{2}:\d{2}:\d{2} \d{1,2} [A-Za-z]+ \d{4}$",
            )?;
            if let Some(fingerprint) = &pki.fingerprint {
                validate_name("fingerprint", fingerprint, r"^[0-9A-Fa-f]{32,64}$")?;
            }
        }

        match (self.shape, &self.mesh) {
            (Shape::PartialMesh, Some(mesh)) => {
                if !(0.0..=1.0).contains(&mesh.chord_probability) {
                    return Err(ParameterError::MeshProbability(mesh.chord_probability));
                }
                if mesh.max_degree < 2 {
                    return Err(ParameterError::MeshDegree(mesh.max_degree));
                }
            }
            (Shape::PartialMesh, None) => {
                return Err(ParameterError::MissingDependency {
                    feature: "the partial-mesh shape",
                    dependency: "mesh parameters",
                })
            }
            _ => {}
        }

        Ok(())
    }

    fn validate_overlay(&self, overlay: &OverlayParams) -> Result<(), ParameterError> {
        if overlay.hubs.is_empty() {
            return Err(ParameterError::EmptyHubSet);
        }
        let mut seen = BTreeSet::new();
        for &hub in &overlay.hubs {
            if hub == 0 || hub > self.nodes {
                return Err(ParameterError::HubOutOfRange {
                    hub,
                    nodes: self.nodes,
                });
            }
            if !seen.insert(hub) {
                return Err(ParameterError::DuplicateHub { hub });
            }
            if overlay.underlay == Underlay::PairedStar && hub % 2 == 0 {
                return Err(ParameterError::HubNotOverlayCapable { hub });
            }
        }
        let endpoints = match overlay.underlay {
            Underlay::Star => self.nodes,
            Underlay::PairedStar => self.nodes.div_ceil(2),
        };
        if endpoints <= overlay.hubs.len() as u32 {
            return Err(ParameterError::NoSpokes);
        }
        if !matches!(overlay.phase, 2 | 3) {
            return Err(ParameterError::UnsupportedPhase(overlay.phase));
        }
        match overlay.security {
            OverlaySecurity::Psk if overlay.psk.as_deref().map_or(true, str::is_empty) => {
                return Err(ParameterError::MissingSharedSecret)
            }
            OverlaySecurity::Pki if self.pki.is_none() => {
                return Err(ParameterError::MissingCertificateAuthority)
            }
            _ => {}
        }
        if overlay.eigrp_stub && overlay.underlay != Underlay::PairedStar {
            return Err(ParameterError::MissingDependency {
                feature: "EIGRP stub peers",
                dependency: "a paired-star underlay",
            });
        }
        if overlay.eigrp_stub && self.routing != RoutingProtocol::Eigrp {
            return Err(ParameterError::MissingDependency {
                feature: "EIGRP stub peers",
                dependency: "EIGRP routing",
            });
        }
        for (pool, purpose) in [(overlay.nbma, "NBMA addressing"), (overlay.tunnel, "tunnel addressing")] {
            if pool.prefix() > 30 {
                return Err(ParameterError::PoolTooNarrow {
                    pool: crate::ip::PoolKind::Overlay,
                    cidr: pool,
                    purpose,
                });
            }
        }
        Ok(())
    }
}

fn validate_vrf(name: &str) -> Result<(), ParameterError> {
    validate_name("VRF", name, r"^[A-Za-z][A-Za-z0-9_-]{0,31}$")
}

fn validate_name(kind: &'static str, name: &str, pattern: &str) -> Result<(), ParameterError> {
    let invalid = || ParameterError::InvalidName {
        kind,
        name: name.to_string(),
    };
    let re = Regex::new(pattern).map_err(|_| invalid())?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate_for_every_shape() {
        for shape in [Shape::Star, Shape::PairedStar, Shape::HubOverlay, Shape::PartialMesh] {
            let params = GenerationParams::new(shape, 10);
            assert!(params.validate().is_ok(), "{shape} defaults should validate");
        }
    }

    #[test]
    fn test_node_count_bounds() {
        assert!(matches!(
            GenerationParams::new(Shape::Star, 1).validate(),
            Err(ParameterError::NodeCount { nodes: 1, .. })
        ));
        assert!(matches!(
            GenerationParams::new(Shape::Star, 1001).validate(),
            Err(ParameterError::NodeCount { nodes: 1001, .. })
        ));
        assert!(GenerationParams::new(Shape::Star, 1000).validate().is_ok());
    }

    #[test]
    fn test_hub_validation() {
        let mut params = GenerationParams::new(Shape::HubOverlay, 10);
        params.overlay.as_mut().unwrap().hubs = vec![11];
        assert!(matches!(params.validate(), Err(ParameterError::HubOutOfRange { hub: 11, .. })));

        let overlay = params.overlay.as_mut().unwrap();
        overlay.hubs = vec![1, 2];
        overlay.underlay = Underlay::PairedStar;
        assert!(matches!(params.validate(), Err(ParameterError::HubNotOverlayCapable { hub: 2 })));

        params.overlay.as_mut().unwrap().hubs = vec![3, 3];
        assert!(matches!(params.validate(), Err(ParameterError::DuplicateHub { hub: 3 })));

        params.overlay.as_mut().unwrap().hubs.clear();
        assert!(matches!(params.validate(), Err(ParameterError::EmptyHubSet)));
    }

    #[test]
    fn test_hubs_require_overlay_shape() {
        let mut params = GenerationParams::new(Shape::Star, 10);
        params.overlay = Some(OverlayParams::default());
        assert!(matches!(params.validate(), Err(ParameterError::HubsWithoutOverlay { .. })));
    }

    #[test]
    fn test_security_dependencies_named() {
        let mut params = GenerationParams::new(Shape::HubOverlay, 10);
        params.overlay.as_mut().unwrap().security = OverlaySecurity::Psk;
        let err = params.validate().unwrap_err();
        assert!(matches!(err, ParameterError::MissingSharedSecret));
        assert!(err.to_string().contains("pre-shared key"));

        params.overlay.as_mut().unwrap().security = OverlaySecurity::Pki;
        assert!(matches!(params.validate(), Err(ParameterError::MissingCertificateAuthority)));

        params.pki = Some(PkiParams::from_config(&Config::default()));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_client_delay_must_follow_ca_delay() {
        let mut params = GenerationParams::new(Shape::Star, 4);
        let mut pki = PkiParams::from_config(&Config::default());
        pki.client_delay = pki.ca_delay;
        params.pki = Some(pki);
        assert!(matches!(params.validate(), Err(ParameterError::DelayOrdering { .. })));
    }

    #[test]
    fn test_management_slot_must_clear_data_slots() {
        let mut params = GenerationParams::new(Shape::PairedStar, 4);
        params.management = Some(ManagementParams {
            slot: 1,
            ..ManagementParams::default()
        });
        assert!(matches!(
            params.validate(),
            Err(ParameterError::ManagementSlot { slot: 1, reserved: 1 })
        ));

        let mut params = GenerationParams::new(Shape::PartialMesh, 4);
        params.management = Some(ManagementParams::default());
        assert!(matches!(
            params.validate(),
            Err(ParameterError::ManagementSlot { slot: 5, reserved: 5 })
        ));
    }

    #[test]
    fn test_default_management_slot_clears_data_plane() {
        assert_eq!(GenerationParams::new(Shape::Star, 4).default_management_slot(), 5);
        assert_eq!(GenerationParams::new(Shape::PairedStar, 4).default_management_slot(), 5);

        let mut params = GenerationParams::new(Shape::PartialMesh, 4);
        assert_eq!(params.default_management_slot(), 6);
        params.management = Some(ManagementParams {
            slot: params.default_management_slot(),
            ..ManagementParams::default()
        });
        assert!(params.validate().is_ok());

        params.mesh.as_mut().unwrap().max_degree = 7;
        assert_eq!(params.default_management_slot(), 9);
    }

    #[test]
    fn test_pair_vrf_requires_pairs_and_valid_name() {
        let mut params = GenerationParams::new(Shape::Star, 4);
        params.pair_vrf = Some("tenant".to_string());
        assert!(matches!(params.validate(), Err(ParameterError::MissingDependency { .. })));

        let mut params = GenerationParams::new(Shape::PairedStar, 4);
        params.pair_vrf = Some("bad vrf".to_string());
        assert!(matches!(params.validate(), Err(ParameterError::InvalidName { kind: "VRF", .. })));
    }

    #[test]
    fn test_interface_labels_per_platform() {
        assert_eq!(Platform::Iosv.interface_label(1), "GigabitEthernet0/1");
        assert_eq!(Platform::Csr1000v.interface_label(0), "GigabitEthernet1");
        assert_eq!(Platform::Iol.interface_label(5), "Ethernet1/1");
    }

    #[test]
    fn test_psk_never_serialized() {
        let mut params = GenerationParams::new(Shape::HubOverlay, 4);
        let overlay = params.overlay.as_mut().unwrap();
        overlay.security = OverlaySecurity::Psk;
        overlay.psk = Some("s3cr3t-value".to_string());
        let yaml = serde_yaml::to_string(&params).unwrap();
        assert!(!yaml.contains("s3cr3t-value"));
        assert!(yaml.contains("hub-overlay"));
    }
}
