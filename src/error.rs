//! Error taxonomy for lab generation.
//!
//! Every failure the engine can report falls into one of four classes.
//! Parameter, capacity and synthesis errors are raised before any artifact
//! is written or any remote call is made; emission errors come from the
//! backends.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::emit::controller::ControllerError;
use crate::ip::{Cidr, PoolKind};

/// Top-level error returned by the generation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TopogenError {
    #[error("invalid parameters: {0}")]
    Parameter(#[from] ParameterError),
    #[error("capacity exceeded: {0}")]
    Capacity(#[from] CapacityError),
    #[error("configuration synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("emission failed: {0}")]
    Emission(#[from] EmissionError),
}

/// Contradictory or out-of-range generation parameters.
#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    #[error("node count {nodes} is outside the supported range {min}..={max}")]
    NodeCount { nodes: u32, min: u32, max: u32 },

    #[error("group size must be at least 1")]
    ZeroGroupSize,

    #[error("node distance must be at least 1")]
    ZeroDistance,

    #[error("hub ordinals were given but the shape is {shape}, not hub-overlay")]
    HubsWithoutOverlay { shape: String },

    #[error("the hub set is empty")]
    EmptyHubSet,

    #[error("hub ordinal {hub} is outside 1..={nodes}")]
    HubOutOfRange { hub: u32, nodes: u32 },

    #[error("hub ordinal {hub} is listed more than once")]
    DuplicateHub { hub: u32 },

    #[error("hub ordinal {hub} is an even pair peer; hubs on a paired-star underlay must be odd")]
    HubNotOverlayCapable { hub: u32 },

    #[error("every overlay endpoint is a hub; at least one spoke is required")]
    NoSpokes,

    #[error("overlay phase {0} is not supported (expected 2 or 3)")]
    UnsupportedPhase(u8),

    #[error("overlay security 'psk' requires a pre-shared key (--psk or TOPOGEN_PSK)")]
    MissingSharedSecret,

    #[error("overlay security 'pki' requires certificate authority injection (--pki)")]
    MissingCertificateAuthority,

    #[error("{feature} requires {dependency}")]
    MissingDependency {
        feature: &'static str,
        dependency: &'static str,
    },

    #[error("client enrollment delay {client}s must be greater than the CA clock delay {anchor}s")]
    DelayOrdering { anchor: u64, client: u64 },

    #[error("invalid {kind} name '{name}'")]
    InvalidName { kind: &'static str, name: String },

    #[error("management slot {slot} collides with the data interfaces (slots 0..={reserved})")]
    ManagementSlot { slot: u32, reserved: u32 },

    #[error("management gateway {gateway} is outside the management pool {cidr}")]
    GatewayOutsidePool { gateway: Ipv4Addr, cidr: Cidr },

    #[error("mesh chord probability {0} is outside 0.0..=1.0")]
    MeshProbability(f64),

    #[error("mesh maximum degree {0} is too small (at least 2 is required)")]
    MeshDegree(u32),

    #[error("{pool} pool {cidr} is too narrow for {purpose}")]
    PoolTooNarrow {
        pool: PoolKind,
        cidr: Cidr,
        purpose: &'static str,
    },

    #[error("template '{0}' does not exist (see --list-templates)")]
    UnknownTemplate(String),
}

/// A platform or pool ceiling would be exceeded.
#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    #[error("{pool} pool {cidr} needs {required} addresses but only {available} are usable")]
    PoolExhausted {
        pool: PoolKind,
        cidr: Cidr,
        required: u64,
        available: u64,
    },

    #[error("{pool} ordinal {ordinal} does not fit in {cidr}")]
    OrdinalOutOfPool {
        pool: PoolKind,
        cidr: Cidr,
        ordinal: u64,
    },

    #[error("the {pool} pool is not in use for this lab")]
    PoolNotConfigured { pool: PoolKind },

    #[error("management gateway {gateway} collides with the address of {owner}")]
    GatewayCollision { gateway: Ipv4Addr, owner: String },

    #[error("{nodes} routers exceed the recommended ceiling of {ceiling} (use --allow-oversubscribe to bypass)")]
    NodeCeiling { nodes: u32, ceiling: u32 },

    #[error("switch {switch} would need {ports} ports but the ceiling is {ceiling}")]
    PortCeiling {
        switch: String,
        ports: u32,
        ceiling: u32,
    },

    #[error("{resource} would be placed at {projected}, beyond the canvas bound {bound}, and spacing cannot shrink below {min_spacing}")]
    Coordinate {
        resource: String,
        projected: i64,
        bound: i64,
        min_spacing: u32,
    },

    #[error("address {address} is assigned to both {first} and {second}")]
    DuplicateAddress {
        address: Ipv4Addr,
        first: String,
        second: String,
    },

    #[error("{owner} uses slot {slot} twice")]
    DuplicateSlot { owner: String, slot: u32 },
}

/// Block assembly failed for a node.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("{node}: block '{block}' references {symbol} before it is defined")]
    UndefinedReference {
        node: String,
        block: &'static str,
        symbol: String,
    },

    #[error("{node}: applet '{applet}' needs more than {limit} actions")]
    AppletOverflow {
        node: String,
        applet: String,
        limit: usize,
    },

    #[error("{node} already carries a configuration")]
    AlreadyConfigured { node: String },

    #[error("{node}: cannot configure the host, {missing}")]
    IncompleteHost { node: String, missing: &'static str },
}

/// An artifact could not be written or replayed.
#[derive(Debug, thiserror::Error)]
pub enum EmissionError {
    #[error("Refusing to overwrite existing file: {}. Use --overwrite to replace it.", .path.display())]
    TargetExists { path: PathBuf },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize the lab document: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("controller call '{step}' failed after {completed} successful calls: {source}")]
    Controller {
        step: String,
        completed: usize,
        #[source]
        source: ControllerError,
    },

    #[error("configuration push failed for {} node(s): {}", .failures.len(), .failures.iter().map(|(node, err)| format!("{node} ({err})")).collect::<Vec<_>>().join(", "))]
    Configuration {
        failures: Vec<(String, ControllerError)>,
    },
}
