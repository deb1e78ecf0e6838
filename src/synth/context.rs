//! Per-node render context.
//!
//! Everything a template reads is resolved here into plain values, with
//! disabled features as explicit `None`s, so templates never look at the
//! plan or the parameters directly.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::config::Config;
use crate::error::SynthesisError;
use crate::ip::{Cidr, IfaceAddr};
use crate::params::{GenerationParams, OverlaySecurity, RoutingProtocol};
use crate::synth::applet::{self, Applet};
use crate::topology::{Endpoint, InterfaceRole, NodeIndex, Role, TopologyPlan, TUNNEL_SLOT};

pub const IKEV2_PROPOSAL: &str = "TOPOGEN-PROPOSAL";
pub const IKEV2_POLICY: &str = "TOPOGEN-POLICY";
pub const IKEV2_KEYRING: &str = "TOPOGEN-KEYRING";
pub const IKEV2_PROFILE: &str = "TOPOGEN-IKEV2";
pub const TRANSFORM_SET: &str = "TOPOGEN-TS";
pub const IPSEC_PROFILE: &str = "TOPOGEN-IPSEC";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceContext {
    pub slot: u32,
    pub name: String,
    pub description: Option<String>,
    pub address: Option<IfaceAddr>,
    pub vrf: Option<String>,
    pub role: InterfaceRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingContext {
    pub protocol: RoutingProtocol,
    pub router_id: Ipv4Addr,
    /// Interface addresses advertised with a host wildcard.
    pub networks: Vec<Ipv4Addr>,
    pub stub: bool,
    /// Advertise the static default route.
    pub originate_default: bool,
    /// Interfaces where split horizon and next-hop-self are disabled.
    pub hub_tunnel: Option<String>,
}

/// An NHRP server as seen from a spoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubPeer {
    pub label: String,
    pub tunnel: Ipv4Addr,
    pub nbma: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayContext {
    pub is_hub: bool,
    pub tunnel: IfaceAddr,
    pub source: String,
    pub key: u32,
    pub phase: u8,
    /// Primary hub first. Empty on hubs.
    pub servers: Vec<HubPeer>,
    pub security: OverlaySecurity,
    pub psk: Option<String>,
    pub trustpoint: Option<String>,
    pub protocol: RoutingProtocol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementContext {
    pub interface: String,
    pub vrf: Option<String>,
    pub gateway: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtpServer {
    pub address: Ipv4Addr,
    pub vrf: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtpContext {
    pub servers: Vec<NtpServer>,
    /// Serve time to the lab.
    pub master: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustContext {
    /// The CA runs the PKI server.
    Authority { server: String, rsa_label: String },
    /// A router enrolling with the CA.
    Client {
        trustpoint: String,
        rsa_label: String,
        enrollment_url: String,
        subject: String,
        fingerprint: Option<String>,
    },
}

/// DNS host specifics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    pub uplink: String,
    pub lab_side: String,
    pub address: IfaceAddr,
    pub gateway: Ipv4Addr,
    /// Lab prefixes routed through the core router.
    pub routes: Vec<Cidr>,
    /// `(address, hostname)` for every router loopback.
    pub zone: Vec<(Ipv4Addr, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub hostname: String,
    pub role: Role,
    pub domain: String,
    pub username: String,
    pub password: String,
    pub nameserver: Ipv4Addr,
    pub loopback: Option<IfaceAddr>,
    pub vrfs: Vec<String>,
    pub interfaces: Vec<InterfaceContext>,
    pub routing: Option<RoutingContext>,
    pub overlay: Option<OverlayContext>,
    pub management: Option<ManagementContext>,
    pub ntp: Option<NtpContext>,
    pub trust: Option<TrustContext>,
    pub default_route: Option<Ipv4Addr>,
    pub applets: Vec<Applet>,
    pub host: Option<HostContext>,
}

/// Facts shared by every node of a lab, gathered once.
#[derive(Debug, Clone)]
pub struct LabFacts {
    /// Description of the far end of every node interface.
    peers: HashMap<(NodeIndex, u32), String>,
    ca_address: Option<Ipv4Addr>,
    dns_address: Option<Ipv4Addr>,
    hubs: Vec<NodeIndex>,
    primary: HashMap<NodeIndex, NodeIndex>,
}

impl LabFacts {
    pub fn collect(plan: &TopologyPlan, params: &GenerationParams) -> Self {
        let mut peers = HashMap::new();
        for link in &plan.links {
            for (near, far) in [(link.a, link.b), (link.b, link.a)] {
                if let Endpoint::Node { node, slot } = near {
                    peers.insert((node, slot), describe_far_end(plan, params, &far));
                }
            }
        }

        let ca_address = plan
            .nodes_with_role(Role::CertificateAuthority)
            .next()
            .and_then(|(_, ca)| ca.interface(0))
            .and_then(|iface| iface.address)
            .map(|addr| addr.address);
        let dns_address = plan
            .nodes_with_role(Role::DnsHost)
            .next()
            .and_then(|(_, dns)| dns.interface(1))
            .and_then(|iface| iface.address)
            .map(|addr| addr.address);

        LabFacts {
            peers,
            ca_address,
            dns_address,
            hubs: plan.nodes_with_role(Role::Hub).map(|(idx, _)| idx).collect(),
            primary: plan.overlay.iter().map(|adj| (adj.spoke, adj.hub)).collect(),
        }
    }
}

fn describe_far_end(plan: &TopologyPlan, params: &GenerationParams, far: &Endpoint) -> String {
    match far {
        Endpoint::Node { node, slot } => {
            let peer = &plan.nodes[*node];
            format!("to {} {}", peer.label, peer.interface_label(params.platform, *slot))
        }
        Endpoint::Switch { switch, port } => {
            format!("to {} port{}", plan.switches[*switch].label, port)
        }
    }
}

impl RenderContext {
    pub fn for_node(
        plan: &TopologyPlan,
        idx: NodeIndex,
        params: &GenerationParams,
        config: &Config,
        facts: &LabFacts,
    ) -> Result<Self, SynthesisError> {
        let node = &plan.nodes[idx];
        let platform = params.platform;
        let is_authority = node.role == Role::CertificateAuthority;

        let interfaces: Vec<InterfaceContext> = node
            .physical_interfaces()
            .map(|iface| InterfaceContext {
                slot: iface.slot,
                name: node.interface_label(platform, iface.slot),
                description: facts.peers.get(&(idx, iface.slot)).cloned(),
                address: iface.address,
                vrf: iface.vrf.clone(),
                role: iface.role,
            })
            .collect();

        let mut vrfs: Vec<String> = interfaces.iter().filter_map(|i| i.vrf.clone()).collect();
        if let Some(vrf) = params.ntp.as_ref().and_then(|n| n.vrf.clone()) {
            vrfs.push(vrf);
        }
        vrfs.sort();
        vrfs.dedup();

        let is_core = plan.core_router == Some(idx);
        let default_route = facts.dns_address.filter(|_| is_core);

        // A global-table management gateway would compete with the core
        // router's default toward the external connector.
        let management = params.management.as_ref().and_then(|mgmt| {
            node.interface(mgmt.slot).map(|_| ManagementContext {
                interface: node.interface_label(platform, mgmt.slot),
                vrf: mgmt.vrf.clone(),
                gateway: mgmt
                    .gateway
                    .filter(|_| mgmt.vrf.is_some() || default_route.is_none()),
            })
        });

        let overlay = overlay_context(plan, idx, params, facts);

        let routing = node.loopback.map(|loopback| {
            let mut networks = vec![loopback.address];
            networks.extend(
                node.interfaces
                    .iter()
                    .filter(|iface| iface.vrf.is_none())
                    .filter(|iface| routed(iface.role, node.role))
                    .filter_map(|iface| iface.address.map(|a| a.address)),
            );
            RoutingContext {
                protocol: params.routing,
                router_id: loopback.address,
                networks,
                stub: node.role == Role::PairPeer
                    && params.overlay.as_ref().is_some_and(|o| o.eigrp_stub),
                originate_default: default_route.is_some(),
                hub_tunnel: overlay
                    .as_ref()
                    .filter(|o| o.is_hub)
                    .map(|_| node.interface_label(platform, TUNNEL_SLOT)),
            }
        });

        let trust = params.pki.as_ref().map(|pki| {
            if is_authority {
                TrustContext::Authority {
                    server: pki.ca_name.clone(),
                    rsa_label: pki.ca_name.clone(),
                }
            } else {
                TrustContext::Client {
                    trustpoint: pki.trustpoint.clone(),
                    rsa_label: pki.trustpoint.clone(),
                    enrollment_url: facts
                        .ca_address
                        .map(|ca| format!("http://{ca}:80"))
                        .unwrap_or_default(),
                    subject: format!("CN={}.{}", node.label, config.domainname),
                    fingerprint: pki.fingerprint.clone(),
                }
            }
        });

        let mut ntp_servers: Vec<NtpServer> = params
            .ntp
            .iter()
            .map(|ntp| NtpServer {
                address: ntp.server,
                vrf: ntp.vrf.clone(),
            })
            .collect();
        if params.pki.is_some() && !is_authority {
            if let Some(ca) = facts.ca_address {
                ntp_servers.push(NtpServer { address: ca, vrf: None });
            }
        }
        let ntp = (!ntp_servers.is_empty() || (is_authority && params.pki.is_some())).then(|| {
            NtpContext {
                servers: ntp_servers,
                master: is_authority,
            }
        });

        let mut applets = Vec::new();
        if let Some(pki) = &params.pki {
            let applet = if is_authority {
                applet::authority_applet(
                    &node.label,
                    &pki.ca_name,
                    pki.ca_delay,
                    &pki.clock_anchor,
                    &config.password,
                )?
            } else {
                let stagger = std::time::Duration::from_secs(u64::from(node.ordinal % 10));
                applet::enrollment_applet(
                    &node.label,
                    &pki.trustpoint,
                    pki.client_delay + stagger,
                    &pki.clock_anchor,
                    &config.password,
                )?
            };
            applets.push(applet);
        }

        Ok(RenderContext {
            hostname: node.label.clone(),
            role: node.role,
            domain: config.domainname.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            nameserver: facts.dns_address.unwrap_or(config.nameserver),
            loopback: node.loopback,
            vrfs,
            interfaces,
            routing,
            overlay,
            management,
            ntp,
            trust,
            default_route,
            applets,
            host: None,
        })
    }

    /// Context of the DNS host: its addresses and the zone of every router.
    pub fn for_dns_host(
        plan: &TopologyPlan,
        idx: NodeIndex,
        params: &GenerationParams,
        config: &Config,
        lab_routes: Vec<Cidr>,
    ) -> Result<Self, SynthesisError> {
        let node = &plan.nodes[idx];
        let incomplete = |missing| SynthesisError::IncompleteHost {
            node: node.label.clone(),
            missing,
        };
        let address = node
            .interface(1)
            .and_then(|iface| iface.address)
            .ok_or_else(|| incomplete("no addressed lab-side interface"))?;
        let core = plan
            .core_router
            .map(|core| &plan.nodes[core])
            .ok_or_else(|| incomplete("no core router"))?;
        let gateway = core
            .interfaces
            .iter()
            .filter_map(|iface| iface.address)
            .find(|addr| addr.network() == address.network())
            .ok_or_else(|| incomplete("core router has no address on the host network"))?
            .address;

        let mut zone: Vec<(Ipv4Addr, String)> = plan
            .nodes
            .iter()
            .filter_map(|n| n.loopback.map(|lo| (lo.address, n.label.clone())))
            .collect();
        zone.push((address.address, node.label.clone()));

        Ok(RenderContext {
            hostname: node.label.clone(),
            role: node.role,
            domain: config.domainname.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            nameserver: config.nameserver,
            loopback: None,
            vrfs: Vec::new(),
            interfaces: Vec::new(),
            routing: None,
            overlay: None,
            management: None,
            ntp: None,
            trust: None,
            default_route: None,
            applets: Vec::new(),
            host: Some(HostContext {
                uplink: node.interface_label(params.platform, 0),
                lab_side: node.interface_label(params.platform, 1),
                address,
                gateway,
                routes: lab_routes,
                zone,
            }),
        })
    }

    /// Minimal context for nodes that only carry a mode string.
    pub fn bare(plan: &TopologyPlan, idx: NodeIndex, config: &Config) -> Self {
        let node = &plan.nodes[idx];
        RenderContext {
            hostname: node.label.clone(),
            role: node.role,
            domain: config.domainname.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            nameserver: config.nameserver,
            loopback: None,
            vrfs: Vec::new(),
            interfaces: Vec::new(),
            routing: None,
            overlay: None,
            management: None,
            ntp: None,
            trust: None,
            default_route: None,
            applets: Vec::new(),
            host: None,
        }
    }
}

/// Whether an interface takes part in the routing protocol.
fn routed(iface: InterfaceRole, node: Role) -> bool {
    match iface {
        InterfaceRole::Management => false,
        // the NBMA underlay is reached directly, never advertised into the overlay
        InterfaceRole::Uplink => !node.is_overlay_endpoint(),
        _ => true,
    }
}

fn overlay_context(
    plan: &TopologyPlan,
    idx: NodeIndex,
    params: &GenerationParams,
    facts: &LabFacts,
) -> Option<OverlayContext> {
    let overlay = params.overlay.as_ref()?;
    let node = &plan.nodes[idx];
    let tunnel = node.tunnel()?.address?;
    let is_hub = node.role == Role::Hub;

    let servers = if is_hub {
        Vec::new()
    } else {
        let primary = facts.primary.get(&idx).copied();
        primary
            .into_iter()
            .chain(facts.hubs.iter().copied().filter(|h| Some(*h) != primary))
            .filter_map(|hub| hub_peer(plan, hub))
            .collect()
    };

    Some(OverlayContext {
        is_hub,
        tunnel,
        source: node.interface_label(params.platform, 0),
        key: overlay.tunnel_key,
        phase: overlay.phase,
        servers,
        security: overlay.security,
        psk: overlay.psk.clone().filter(|_| overlay.security == OverlaySecurity::Psk),
        trustpoint: params
            .pki
            .as_ref()
            .filter(|_| overlay.security == OverlaySecurity::Pki)
            .map(|pki| pki.trustpoint.clone()),
        protocol: params.routing,
    })
}

fn hub_peer(plan: &TopologyPlan, hub: NodeIndex) -> Option<HubPeer> {
    let node = &plan.nodes[hub];
    Some(HubPeer {
        label: node.label.clone(),
        tunnel: node.tunnel()?.address?.address,
        nbma: node.interface(0)?.address?.address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::AddressPlan;
    use crate::params::{ManagementParams, PkiParams, Shape};
    use crate::topology;

    fn contexts(params: &GenerationParams) -> (TopologyPlan, Vec<Option<RenderContext>>) {
        let config = Config::default();
        let addresses = AddressPlan::new(params, &config);
        let plan = topology::build(params, &addresses).unwrap();
        let facts = LabFacts::collect(&plan, params);
        let ctx = (0..plan.nodes.len())
            .map(|idx| {
                plan.nodes[idx]
                    .role
                    .is_router()
                    .then(|| RenderContext::for_node(&plan, idx, params, &config, &facts).unwrap())
            })
            .collect();
        (plan, ctx)
    }

    #[test]
    fn test_spoke_lists_primary_hub_first() {
        let mut params = GenerationParams::new(Shape::HubOverlay, 30);
        params.overlay.as_mut().unwrap().hubs = vec![1, 21];
        let (plan, ctx) = contexts(&params);
        let r25 = plan.nodes.iter().position(|n| n.label == "R25").unwrap();
        let overlay = ctx[r25].as_ref().unwrap().overlay.as_ref().unwrap();
        let labels: Vec<&str> = overlay.servers.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["R21", "R1"]);
        assert_eq!(overlay.servers[0].nbma.to_string(), "10.10.0.21");
        assert_eq!(overlay.servers[0].tunnel.to_string(), "172.20.0.21");
    }

    #[test]
    fn test_interface_description_names_far_end() {
        let params = GenerationParams::new(Shape::PairedStar, 4);
        let (_, ctx) = contexts(&params);
        let r1 = ctx[0].as_ref().unwrap();
        assert_eq!(r1.interfaces[1].description.as_deref(), Some("to R2 GigabitEthernet0/0"));
        assert_eq!(r1.interfaces[0].description.as_deref(), Some("to SW1 port1"));
    }

    #[test]
    fn test_client_delay_staggered_after_ca() {
        let config = Config::default();
        let mut params = GenerationParams::new(Shape::Star, 12);
        params.pki = Some(PkiParams::from_config(&config));
        let (plan, ctx) = contexts(&params);

        let r7 = ctx[6].as_ref().unwrap();
        assert_eq!(r7.applets[0].event, "timer countdown time 247");
        let ntp = r7.ntp.as_ref().unwrap();
        assert_eq!(ntp.servers[0].address.to_string(), "10.10.255.254");

        let facts = LabFacts::collect(&plan, &params);
        let ca = plan.nodes.iter().position(|n| n.role == Role::CertificateAuthority).unwrap();
        let ca_ctx = RenderContext::for_node(&plan, ca, &params, &config, &facts).unwrap();
        assert_eq!(ca_ctx.applets[0].event, "timer countdown time 120");
        assert!(ca_ctx.ntp.unwrap().master);
        assert!(matches!(ca_ctx.trust, Some(TrustContext::Authority { .. })));
    }

    #[test]
    fn test_core_router_keeps_single_global_default() {
        let mut params = GenerationParams::new(Shape::PartialMesh, 8);
        params.management = Some(ManagementParams {
            gateway: Some(Ipv4Addr::new(10, 254, 255, 1)),
            slot: 6,
            ..ManagementParams::default()
        });
        let (plan, ctx) = contexts(&params);
        let core = plan.core_router.unwrap();
        let core_ctx = ctx[core].as_ref().unwrap();
        assert!(core_ctx.default_route.is_some());
        assert_eq!(core_ctx.management.as_ref().unwrap().gateway, None);

        let other = (0..ctx.len()).find(|&i| i != core && ctx[i].is_some()).unwrap();
        let other_ctx = ctx[other].as_ref().unwrap();
        assert_eq!(other_ctx.default_route, None);
        assert_eq!(
            other_ctx.management.as_ref().unwrap().gateway,
            Some(Ipv4Addr::new(10, 254, 255, 1))
        );

        params.management.as_mut().unwrap().vrf = Some("Mgmt-intf".to_string());
        let (_, ctx) = contexts(&params);
        let core_ctx = ctx[core].as_ref().unwrap();
        assert_eq!(
            core_ctx.management.as_ref().unwrap().gateway,
            Some(Ipv4Addr::new(10, 254, 255, 1))
        );
    }
}
