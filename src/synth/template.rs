//! Device syntax.
//!
//! A [`Template`] turns one block of one node's [`RenderContext`] into
//! text. It owns syntax only: which blocks appear, and in what order, is
//! decided by the synthesizer.

use crate::ip::net::wildcard;
use crate::params::{OverlaySecurity, RoutingProtocol};
use crate::synth::blocks::BlockKind;
use crate::synth::context::{
    OverlayContext, RenderContext, TrustContext, IKEV2_KEYRING, IKEV2_POLICY, IKEV2_PROFILE,
    IKEV2_PROPOSAL, IPSEC_PROFILE, TRANSFORM_SET,
};

const EIGRP_AS: u32 = 100;
const OSPF_PROCESS: u32 = 1;

pub trait Template {
    fn name(&self) -> &str;

    /// Render one block. Blocks with nothing to say return an empty string.
    fn render(&self, block: BlockKind, ctx: &RenderContext) -> String;
}

/// Names accepted by [`lookup`].
pub fn available() -> &'static [&'static str] {
    &["ios"]
}

pub fn lookup(name: &str) -> Option<Box<dyn Template>> {
    match name {
        "ios" => Some(Box::new(IosTemplate)),
        _ => None,
    }
}

/// IOS / IOS-XE syntax.
#[derive(Debug, Default, Clone, Copy)]
pub struct IosTemplate;

impl Template for IosTemplate {
    fn name(&self) -> &str {
        "ios"
    }

    fn render(&self, block: BlockKind, ctx: &RenderContext) -> String {
        let mut out = Vec::new();
        match block {
            BlockKind::Preamble => preamble(&mut out, ctx),
            BlockKind::Vrfs => vrfs(&mut out, ctx),
            BlockKind::RsaKey => rsa_key(&mut out, ctx),
            BlockKind::Trustpoint => trustpoint(&mut out, ctx),
            BlockKind::PkiServer => pki_server(&mut out, ctx),
            BlockKind::OverlayCrypto => {
                if let Some(overlay) = &ctx.overlay {
                    overlay_crypto(&mut out, overlay);
                }
            }
            BlockKind::Loopback => loopback(&mut out, ctx),
            BlockKind::Interfaces => interfaces(&mut out, ctx),
            BlockKind::Tunnel => {
                if let Some(overlay) = &ctx.overlay {
                    tunnel(&mut out, overlay);
                }
            }
            BlockKind::Routing => routing(&mut out, ctx),
            BlockKind::Routes => routes(&mut out, ctx),
            BlockKind::Access => access(&mut out),
            BlockKind::Ntp => ntp(&mut out, ctx),
            BlockKind::Applets => applets(&mut out, ctx),
            BlockKind::End => out.push("end".to_string()),
            BlockKind::HostScript => host_script(&mut out, ctx),
            BlockKind::Connector => out.push("NAT".to_string()),
        }
        if out.is_empty() {
            return String::new();
        }
        let mut text = out.join("\n");
        text.push('\n');
        text
    }
}

fn preamble(out: &mut Vec<String>, ctx: &RenderContext) {
    out.push(format!("hostname {}", ctx.hostname));
    out.push("!".into());
    out.push("service timestamps debug datetime msec".into());
    out.push("service timestamps log datetime msec".into());
    out.push("no service config".into());
    out.push("!".into());
    out.push(format!("ip domain name {}", ctx.domain));
    out.push(format!("ip name-server {}", ctx.nameserver));
    out.push("ip cef".into());
    out.push("!".into());
    out.push(format!("username {} privilege 15 secret {}", ctx.username, ctx.password));
    out.push(format!("enable secret {}", ctx.password));
    out.push("!".into());
}

fn vrfs(out: &mut Vec<String>, ctx: &RenderContext) {
    for vrf in &ctx.vrfs {
        out.push(format!("vrf definition {vrf}"));
        out.push(" address-family ipv4".into());
        out.push(" exit-address-family".into());
        out.push("!".into());
    }
}

fn rsa_key(out: &mut Vec<String>, ctx: &RenderContext) {
    let label = match &ctx.trust {
        Some(TrustContext::Authority { rsa_label, .. }) => rsa_label,
        Some(TrustContext::Client { rsa_label, .. }) => rsa_label,
        None => return,
    };
    out.push(format!("crypto key generate rsa modulus 2048 label {label}"));
    out.push("!".into());
}

fn trustpoint(out: &mut Vec<String>, ctx: &RenderContext) {
    let Some(TrustContext::Client {
        trustpoint,
        rsa_label,
        enrollment_url,
        subject,
        fingerprint,
    }) = &ctx.trust
    else {
        return;
    };
    out.push(format!("crypto pki trustpoint {trustpoint}"));
    out.push(format!(" enrollment url {enrollment_url}"));
    out.push(format!(" subject-name {subject}"));
    out.push(" revocation-check none".into());
    out.push(format!(" rsakeypair {rsa_label}"));
    if let Some(fingerprint) = fingerprint {
        out.push(format!(" fingerprint {fingerprint}"));
    }
    out.push(" auto-enroll 70".into());
    out.push("!".into());
}

fn pki_server(out: &mut Vec<String>, ctx: &RenderContext) {
    let Some(TrustContext::Authority { server, rsa_label }) = &ctx.trust else {
        return;
    };
    out.push("ip http server".into());
    out.push("!".into());
    out.push(format!("crypto pki server {server}"));
    out.push(" database level minimum".into());
    out.push(" database url nvram:".into());
    out.push(" grant auto".into());
    out.push(" lifetime certificate 730".into());
    out.push(" lifetime ca-certificate 1825".into());
    out.push(" shutdown".into());
    out.push("!".into());
    out.push(format!("crypto pki trustpoint {server}"));
    out.push(" revocation-check crl".into());
    out.push(format!(" rsakeypair {rsa_label}"));
    out.push("!".into());
}

fn overlay_crypto(out: &mut Vec<String>, overlay: &OverlayContext) {
    if overlay.security == OverlaySecurity::None {
        return;
    }
    out.push(format!("crypto ikev2 proposal {IKEV2_PROPOSAL}"));
    out.push(" encryption aes-cbc-256".into());
    out.push(" integrity sha256".into());
    out.push(" group 14".into());
    out.push("!".into());
    out.push(format!("crypto ikev2 policy {IKEV2_POLICY}"));
    out.push(format!(" proposal {IKEV2_PROPOSAL}"));
    out.push("!".into());
    if let Some(psk) = &overlay.psk {
        out.push(format!("crypto ikev2 keyring {IKEV2_KEYRING}"));
        out.push(" peer ANY".into());
        out.push("  address 0.0.0.0 0.0.0.0".into());
        out.push(format!("  pre-shared-key {psk}"));
        out.push("!".into());
    }
    out.push(format!("crypto ikev2 profile {IKEV2_PROFILE}"));
    out.push(" match identity remote address 0.0.0.0".into());
    match (&overlay.psk, &overlay.trustpoint) {
        (_, Some(trustpoint)) => {
            out.push(" identity local dn".into());
            out.push(" authentication remote rsa-sig".into());
            out.push(" authentication local rsa-sig".into());
            out.push(format!(" pki trustpoint {trustpoint}"));
        }
        _ => {
            out.push(" authentication remote pre-share".into());
            out.push(" authentication local pre-share".into());
            out.push(format!(" keyring local {IKEV2_KEYRING}"));
        }
    }
    out.push("!".into());
    out.push(format!("crypto ipsec transform-set {TRANSFORM_SET} esp-aes 256 esp-sha256-hmac"));
    out.push(" mode transport".into());
    out.push("!".into());
    out.push(format!("crypto ipsec profile {IPSEC_PROFILE}"));
    out.push(format!(" set transform-set {TRANSFORM_SET}"));
    out.push(format!(" set ikev2-profile {IKEV2_PROFILE}"));
    out.push("!".into());
}

fn loopback(out: &mut Vec<String>, ctx: &RenderContext) {
    let Some(lo) = ctx.loopback else {
        return;
    };
    out.push("interface Loopback0".into());
    out.push(format!(" ip address {} {}", lo.address, lo.netmask()));
    out.push("!".into());
}

fn interfaces(out: &mut Vec<String>, ctx: &RenderContext) {
    for iface in &ctx.interfaces {
        out.push(format!("interface {}", iface.name));
        match &iface.description {
            Some(description) => out.push(format!(" description {description}")),
            None => out.push(" description unused".into()),
        }
        if let Some(vrf) = &iface.vrf {
            out.push(format!(" vrf forwarding {vrf}"));
        }
        match iface.address {
            Some(addr) => {
                out.push(format!(" ip address {} {}", addr.address, addr.netmask()));
                out.push(" no shutdown".into());
            }
            None => {
                out.push(" no ip address".into());
                out.push(" shutdown".into());
            }
        }
        out.push("!".into());
    }
}

fn tunnel(out: &mut Vec<String>, overlay: &OverlayContext) {
    out.push("interface Tunnel0".into());
    let kind = if overlay.is_hub { "hub" } else { "spoke" };
    out.push(format!(" description DMVPN {kind}"));
    out.push(format!(
        " ip address {} {}",
        overlay.tunnel.address,
        overlay.tunnel.netmask()
    ));
    out.push(" no ip redirects".into());
    out.push(" ip mtu 1400".into());
    out.push(" ip tcp adjust-mss 1360".into());
    out.push(format!(" ip nhrp network-id {}", overlay.key));
    out.push(" ip nhrp holdtime 300".into());
    if overlay.is_hub {
        out.push(" ip nhrp map multicast dynamic".into());
        if overlay.phase == 3 {
            out.push(" ip nhrp redirect".into());
        }
    } else {
        for server in &overlay.servers {
            out.push(format!(
                " ip nhrp nhs {} nbma {} multicast",
                server.tunnel, server.nbma
            ));
        }
        if overlay.phase == 3 {
            out.push(" ip nhrp shortcut".into());
        }
    }
    match overlay.protocol {
        RoutingProtocol::Eigrp if overlay.is_hub => {
            out.push(format!(" no ip split-horizon eigrp {EIGRP_AS}"));
            if overlay.phase == 2 {
                out.push(format!(" no ip next-hop-self eigrp {EIGRP_AS}"));
            }
        }
        RoutingProtocol::Eigrp => {}
        RoutingProtocol::Ospf => {
            let network = if overlay.phase == 2 {
                "broadcast"
            } else {
                "point-to-multipoint"
            };
            out.push(format!(" ip ospf network {network}"));
            if overlay.phase == 2 {
                let priority = if overlay.is_hub { 255 } else { 0 };
                out.push(format!(" ip ospf priority {priority}"));
            }
        }
    }
    out.push(format!(" tunnel source {}", overlay.source));
    out.push(" tunnel mode gre multipoint".into());
    out.push(format!(" tunnel key {}", overlay.key));
    if overlay.security != OverlaySecurity::None {
        out.push(format!(" tunnel protection ipsec profile {IPSEC_PROFILE}"));
    }
    out.push("!".into());
}

fn routing(out: &mut Vec<String>, ctx: &RenderContext) {
    let Some(routing) = &ctx.routing else {
        return;
    };
    let host = wildcard(32);
    match routing.protocol {
        RoutingProtocol::Eigrp => {
            out.push(format!("router eigrp {EIGRP_AS}"));
            out.push(format!(" eigrp router-id {}", routing.router_id));
            for network in &routing.networks {
                out.push(format!(" network {network} {host}"));
            }
            if routing.originate_default {
                out.push(" redistribute static".into());
            }
            if routing.stub {
                out.push(" eigrp stub connected".into());
            }
            out.push(" no auto-summary".into());
        }
        RoutingProtocol::Ospf => {
            out.push(format!("router ospf {OSPF_PROCESS}"));
            out.push(format!(" router-id {}", routing.router_id));
            for network in &routing.networks {
                out.push(format!(" network {network} {host} area 0"));
            }
            if routing.originate_default {
                out.push(" default-information originate".into());
            }
        }
    }
    out.push("!".into());
}

fn routes(out: &mut Vec<String>, ctx: &RenderContext) {
    if let Some(next_hop) = ctx.default_route {
        out.push(format!("ip route 0.0.0.0 0.0.0.0 {next_hop}"));
    }
    if let Some(mgmt) = &ctx.management {
        if let Some(gateway) = mgmt.gateway {
            match &mgmt.vrf {
                Some(vrf) => out.push(format!("ip route vrf {vrf} 0.0.0.0 0.0.0.0 {gateway}")),
                None => out.push(format!("ip route 0.0.0.0 0.0.0.0 {gateway}")),
            }
        }
    }
    if !out.is_empty() {
        out.push("!".into());
    }
}

fn access(out: &mut Vec<String>) {
    out.push("ip ssh version 2".into());
    out.push("!".into());
    out.push("line con 0".into());
    out.push(" exec-timeout 0 0".into());
    out.push(" logging synchronous".into());
    out.push("line vty 0 4".into());
    out.push(" exec-timeout 0 0".into());
    out.push(" login local".into());
    out.push(" transport input ssh telnet".into());
    out.push("!".into());
}

fn ntp(out: &mut Vec<String>, ctx: &RenderContext) {
    let Some(ntp) = &ctx.ntp else {
        return;
    };
    if ntp.master {
        out.push("ntp master 3".into());
    }
    for server in &ntp.servers {
        match &server.vrf {
            Some(vrf) => out.push(format!("ntp server vrf {vrf} {}", server.address)),
            None => out.push(format!("ntp server {}", server.address)),
        }
    }
    out.push("!".into());
}

fn applets(out: &mut Vec<String>, ctx: &RenderContext) {
    for applet in &ctx.applets {
        out.push(format!("event manager applet {}", applet.name));
        out.push(format!(" event {}", applet.event));
        for action in &applet.actions {
            out.push(format!(" action {} {}", action.label, action.body));
        }
        out.push("!".into());
    }
}

fn host_script(out: &mut Vec<String>, ctx: &RenderContext) {
    let Some(host) = &ctx.host else {
        return;
    };
    out.push("#!/bin/sh".into());
    out.push(format!("hostname {}", ctx.hostname));
    out.push(format!("ip link set {} up", host.uplink));
    out.push(format!("udhcpc -i {} -b", host.uplink));
    out.push(format!("ip link set {} up", host.lab_side));
    out.push(format!("ip address add {} dev {}", host.address, host.lab_side));
    for route in &host.routes {
        out.push(format!("ip route add {route} via {}", host.gateway));
    }
    out.push("sysctl -w net.ipv4.ip_forward=1".into());
    out.push(format!("iptables -t nat -A POSTROUTING -o {} -j MASQUERADE", host.uplink));
    out.push("cat >/etc/hosts <<EOF".into());
    out.push("127.0.0.1 localhost".into());
    for (address, name) in &host.zone {
        out.push(format!("{address} {name}.{} {name}", ctx.domain));
    }
    out.push("EOF".into());
    out.push("cat >/etc/dnsmasq.conf <<EOF".into());
    out.push(format!("domain={}", ctx.domain));
    out.push("expand-hosts".into());
    out.push(format!("local=/{}/", ctx.domain));
    out.push(format!("server={}", ctx.nameserver));
    out.push(format!("interface={}", host.lab_side));
    out.push("EOF".into());
    out.push("dnsmasq".into());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert_eq!(lookup("ios").map(|t| t.name().to_string()).as_deref(), Some("ios"));
        assert!(lookup("junos").is_none());
        assert!(available().contains(&"ios"));
    }
}
