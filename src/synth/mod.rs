//! Configuration synthesizer.
//!
//! For every node: build a [`RenderContext`], assemble the ordered block
//! list (checking that every named object is defined before it is used),
//! render each block through the selected [`Template`] and attach the
//! result to the node.

pub mod applet;
pub mod blocks;
pub mod context;
pub mod template;

use log::{debug, info};

use crate::config::Config;
use crate::error::{SynthesisError, TopogenError};
use crate::ip::AddressPlan;
use crate::params::{GenerationParams, OverlaySecurity};
use crate::planner::CapacityReport;
use crate::topology::{Role, TopologyPlan};

pub use applet::{ActionLabeler, Applet, AppletBuilder};
pub use blocks::{Assembly, Block, BlockKind, Symbol};
pub use context::{LabFacts, RenderContext, TrustContext};
pub use template::{IosTemplate, Template};

/// A planned lab with every node configured, ready for an emitter.
#[derive(Debug, Clone)]
pub struct SynthesizedLab {
    pub params: GenerationParams,
    pub plan: TopologyPlan,
    pub report: CapacityReport,
}

/// Configure every node of `plan`.
///
/// Parameters are validated again before the first node is visited so a
/// contradictory feature set never yields a partly configured plan.
pub fn synthesize(
    plan: &mut TopologyPlan,
    params: &GenerationParams,
    config: &Config,
    template: &dyn Template,
) -> Result<(), TopogenError> {
    params.validate()?;

    let facts = LabFacts::collect(plan, params);
    let addresses = AddressPlan::new(params, config);
    let lab_routes = vec![addresses.loopback.cidr, addresses.pair.cidr];

    let mut rendered = Vec::with_capacity(plan.nodes.len());
    for idx in 0..plan.nodes.len() {
        let node = &plan.nodes[idx];
        let (ctx, assembly) = match node.role {
            Role::DnsHost => {
                let ctx =
                    RenderContext::for_dns_host(plan, idx, params, config, lab_routes.clone())?;
                let mut assembly = Assembly::new(&node.label);
                assembly.push(Block::new(BlockKind::HostScript))?;
                (ctx, assembly)
            }
            Role::ExternalConnector => {
                let mut assembly = Assembly::new(&node.label);
                assembly.push(Block::new(BlockKind::Connector))?;
                (RenderContext::bare(plan, idx, config), assembly)
            }
            _ => {
                let ctx = RenderContext::for_node(plan, idx, params, config, &facts)?;
                let assembly = assemble(&ctx)?;
                (ctx, assembly)
            }
        };

        let text: String = assembly
            .blocks()
            .iter()
            .map(|block| template.render(block.kind, &ctx))
            .collect();
        debug!("{}: {} blocks, {} bytes", ctx.hostname, assembly.blocks().len(), text.len());
        rendered.push((idx, text));
    }

    for (idx, text) in rendered {
        plan.nodes[idx].assign_configuration(text)?;
    }
    info!(
        "Synthesized configurations for {} nodes with template '{}'",
        plan.nodes.len(),
        template.name()
    );
    Ok(())
}

/// Ordered blocks for a router or the CA.
pub fn assemble(ctx: &RenderContext) -> Result<Assembly, SynthesisError> {
    let mut assembly = Assembly::new(&ctx.hostname);
    assembly.push(Block::new(BlockKind::Preamble))?;

    if !ctx.vrfs.is_empty() {
        let mut block = Block::new(BlockKind::Vrfs);
        for vrf in &ctx.vrfs {
            block = block.defines(Symbol::Vrf(vrf.clone()));
        }
        assembly.push(block)?;
    }

    // what the applets will touch
    let mut trust_object = None;
    match &ctx.trust {
        Some(TrustContext::Client {
            trustpoint,
            rsa_label,
            ..
        }) => {
            let key = Symbol::RsaKey(rsa_label.clone());
            let tp = Symbol::Trustpoint(trustpoint.clone());
            assembly.push(Block::new(BlockKind::RsaKey).defines(key.clone()))?;
            assembly.push(Block::new(BlockKind::Trustpoint).requires(key).defines(tp.clone()))?;
            trust_object = Some(tp);
        }
        Some(TrustContext::Authority { server, rsa_label }) => {
            let key = Symbol::RsaKey(rsa_label.clone());
            let pki = Symbol::PkiServer(server.clone());
            assembly.push(Block::new(BlockKind::RsaKey).defines(key.clone()))?;
            assembly.push(
                Block::new(BlockKind::PkiServer)
                    .requires(key)
                    .defines(pki.clone())
                    .defines(Symbol::Trustpoint(server.clone())),
            )?;
            trust_object = Some(pki);
        }
        None => {}
    }

    let secured = ctx
        .overlay
        .as_ref()
        .filter(|o| o.security != OverlaySecurity::None);
    if let Some(overlay) = secured {
        let mut block = Block::new(BlockKind::OverlayCrypto)
            .defines(Symbol::IpsecProfile(context::IPSEC_PROFILE.to_string()));
        if overlay.psk.is_some() {
            block = block.defines(Symbol::Keyring(context::IKEV2_KEYRING.to_string()));
        }
        if let Some(tp) = &overlay.trustpoint {
            block = block.requires(Symbol::Trustpoint(tp.clone()));
        }
        assembly.push(block)?;
    }

    if ctx.loopback.is_some() {
        assembly.push(Block::new(BlockKind::Loopback))?;
    }
    assembly.push(
        Block::new(BlockKind::Interfaces)
            .requires_all(ctx.interfaces.iter().filter_map(|i| i.vrf.clone()).map(Symbol::Vrf)),
    )?;

    if let Some(overlay) = &ctx.overlay {
        let mut block = Block::new(BlockKind::Tunnel);
        if overlay.security != OverlaySecurity::None {
            block = block.requires(Symbol::IpsecProfile(context::IPSEC_PROFILE.to_string()));
        }
        assembly.push(block)?;
    }

    if ctx.routing.is_some() {
        assembly.push(Block::new(BlockKind::Routing))?;
    }

    let mgmt_route = ctx.management.as_ref().filter(|m| m.gateway.is_some());
    if ctx.default_route.is_some() || mgmt_route.is_some() {
        assembly.push(
            Block::new(BlockKind::Routes)
                .requires_all(mgmt_route.and_then(|m| m.vrf.clone()).map(Symbol::Vrf)),
        )?;
    }

    assembly.push(Block::new(BlockKind::Access))?;

    if let Some(ntp) = &ctx.ntp {
        assembly.push(
            Block::new(BlockKind::Ntp)
                .requires_all(ntp.servers.iter().filter_map(|s| s.vrf.clone()).map(Symbol::Vrf)),
        )?;
    }

    if !ctx.applets.is_empty() {
        assembly.push(Block::new(BlockKind::Applets).requires_all(trust_object))?;
    }

    assembly.push(Block::new(BlockKind::End))?;
    Ok(assembly)
}
