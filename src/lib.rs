//! # Topogen - Topology and configuration synthesis for CML router labs
//!
//! This library turns a handful of high-level parameters (shape, router
//! count, overlay, management network, certificate authority) into a fully
//! addressed lab with a configuration for every node, then emits it either
//! as a CML lab YAML document or live against a lab controller.
//!
//! ## Pipeline
//!
//! Generation is strictly sequential and keeps no state between runs:
//!
//! - `ip`: deterministic (pool, ordinal) to address mapping
//! - `topology`: one builder per shape plus the shared switch fabric
//! - `planner`: capacity ceilings and canvas coordinates
//! - `synth`: ordered configuration blocks rendered through a `Template`
//! - `emit`: offline YAML and live controller backends
//! - `orchestrator`: runs the stages in order
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use topogen::config::Config;
//! use topogen::emit::OfflineEmitter;
//! use topogen::orchestrator;
//! use topogen::params::{GenerationParams, Shape};
//!
//! let params = GenerationParams::new(Shape::HubOverlay, 63);
//! let mut emitter = OfflineEmitter::new("lab.yaml", false);
//! let report = orchestrator::generate_and_emit(&params, &Config::default(), &mut emitter)?;
//! println!("{} nodes written to {}", report.nodes, report.target);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Library functions return `TopogenError`. Parameter, capacity and
//! synthesis errors are raised before anything is written or sent.

pub mod config;
pub mod config_loader;
pub mod emit;
pub mod error;
pub mod ip;
pub mod orchestrator;
pub mod params;
pub mod planner;
pub mod synth;
pub mod topology;
pub mod utils;

pub use error::TopogenError;
