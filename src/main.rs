use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use topogen::config::Config;
use topogen::config_loader;
use topogen::emit::{
    CmlClient, ControllerSettings, Emitter, LiveEmitter, LogProgress, OfflineEmitter,
};
use topogen::ip::Cidr;
use topogen::orchestrator;
use topogen::params::{
    Addressing, GenerationParams, ManagementParams, MeshParams, NtpParams, OverlayParams,
    OverlaySecurity, PkiParams, Platform, RoutingProtocol, SchemaVersion, Shape, Underlay,
};
use topogen::synth::template;
use topogen::utils::parse_delay;

/// Generate CML router labs: topology, addressing and device configurations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of routers in the lab (2-1000)
    #[arg(required_unless_present_any = ["list_templates", "write"])]
    nodes: Option<u32>,

    /// Topology shape
    #[arg(short, long, value_enum, default_value = "star")]
    mode: Shape,

    /// Tool configuration file
    #[arg(short, long, default_value = "topogen.yaml")]
    config: PathBuf,

    /// Write the effective tool configuration to --config and exit
    #[arg(short, long)]
    write: bool,

    /// Log level (overrides RUST_LOG)
    #[arg(long)]
    loglevel: Option<String>,

    /// List the available configuration templates and exit
    #[arg(long)]
    list_templates: bool,

    /// Configuration template
    #[arg(short, long, default_value = "ios")]
    template: String,

    /// Router node definition
    #[arg(long, value_enum, default_value = "iosv")]
    device_template: Platform,

    /// Lab title
    #[arg(short = 'L', long, default_value = "topogen lab")]
    labname: String,

    /// Routers per access switch
    #[arg(short, long, default_value_t = 20)]
    group_size: u32,

    /// Canvas distance between neighbouring nodes
    #[arg(short, long, default_value_t = 200)]
    distance: u32,

    /// Routing protocol
    #[arg(long, value_enum, default_value = "eigrp")]
    routing: RoutingProtocol,

    /// Loopbacks from 10.255.0.0/16
    #[arg(long)]
    loopback_255: bool,

    /// Uplinks from 10.0.0.0/16
    #[arg(long)]
    gi0_zero: bool,

    /// Put the odd side of each pair link into a VRF
    #[arg(long)]
    vrf: bool,

    /// Name of the pair VRF
    #[arg(long, default_value = "tenant", requires = "vrf")]
    pair_vrf: String,

    // Hub overlay
    /// Underlay beneath the hub overlay
    #[arg(long, value_enum, default_value = "star")]
    underlay: Underlay,

    /// Hub router ordinals, comma separated (default 1)
    #[arg(long, value_delimiter = ',')]
    hubs: Vec<u32>,

    /// DMVPN phase (2 or 3)
    #[arg(long, default_value_t = 2)]
    phase: u8,

    /// Tunnel protection
    #[arg(long, value_enum, default_value = "none")]
    security: OverlaySecurity,

    /// Pre-shared key for --security psk
    #[arg(long, env = "TOPOGEN_PSK", hide_env_values = true)]
    psk: Option<String>,

    /// Tunnel key
    #[arg(long, default_value_t = 10)]
    tunnel_key: u32,

    /// NBMA (underlay) pool for overlay endpoints
    #[arg(long, default_value = "10.10.0.0/16")]
    nbma_cidr: Cidr,

    /// Tunnel interface pool
    #[arg(long, default_value = "172.20.0.0/16")]
    tunnel_cidr: Cidr,

    /// Configure paired peers as EIGRP stubs
    #[arg(long)]
    eigrp_stub: bool,

    // Management
    /// Attach every router to an out-of-band management fabric
    #[arg(long)]
    mgmt: bool,

    /// Management pool
    #[arg(long, default_value = "10.254.0.0/16", requires = "mgmt")]
    mgmt_cidr: Cidr,

    /// Management default gateway
    #[arg(long, requires = "mgmt")]
    mgmt_gw: Option<Ipv4Addr>,

    /// Interface slot used for management [default: 5, or the first slot
    /// past the mesh links]
    #[arg(long, requires = "mgmt")]
    mgmt_slot: Option<u32>,

    /// VRF for the management interface
    #[arg(long, requires = "mgmt")]
    mgmt_vrf: Option<String>,

    /// NTP server
    #[arg(long)]
    ntp: Option<Ipv4Addr>,

    /// VRF used to reach the NTP server
    #[arg(long, requires = "ntp")]
    ntp_vrf: Option<String>,

    // Certificates
    /// Inject a certificate authority and enroll every router
    #[arg(long)]
    pki: bool,

    /// CA boot delay before the PKI server starts (e.g. 120, 2m)
    #[arg(long, value_parser = parse_delay, requires = "pki")]
    pki_ca_delay: Option<Duration>,

    /// Client delay before enrollment (e.g. 240, 4m)
    #[arg(long, value_parser = parse_delay, requires = "pki")]
    pki_client_delay: Option<Duration>,

    /// Expected CA certificate fingerprint
    #[arg(long, requires = "pki")]
    pki_fingerprint: Option<String>,

    // Partial mesh
    /// Seed for chord selection
    #[arg(long, default_value_t = 1)]
    mesh_seed: u64,

    /// Chance of a chord from each router
    #[arg(long, default_value_t = 0.3)]
    mesh_prob: f64,

    /// Maximum links per router
    #[arg(long, default_value_t = 4)]
    mesh_degree: u32,

    // Output
    /// Write a lab YAML file instead of creating the lab on the controller
    #[arg(long)]
    offline_yaml: Option<PathBuf>,

    /// CML lab schema version for offline output
    #[arg(long, value_enum, default_value = "0.3.0")]
    cml_version: SchemaVersion,

    /// Replace existing output files
    #[arg(long)]
    overwrite: bool,

    /// Export the created lab to this file
    #[arg(long, conflicts_with = "offline_yaml")]
    yaml: Option<PathBuf>,

    /// Root certificate for the controller
    #[arg(long, conflicts_with = "offline_yaml")]
    ca: Option<PathBuf>,

    /// Skip controller certificate verification
    #[arg(long, conflicts_with = "offline_yaml")]
    insecure: bool,

    /// Report progress of controller calls
    #[arg(long)]
    progress: bool,

    /// Allow more routers than the recommended ceiling
    #[arg(long)]
    allow_oversubscribe: bool,
}

impl Args {
    /// Assemble generation parameters from the flags and tool configuration.
    fn to_params(&self, config: &Config) -> GenerationParams {
        let nodes = self.nodes.unwrap_or_default();
        let mut params = GenerationParams::new(self.mode, nodes);
        params.lab_name = self.labname.clone();
        params.template = self.template.clone();
        params.platform = self.device_template;
        params.distance = self.distance;
        params.group_size = self.group_size;
        params.routing = self.routing;
        params.addressing = Addressing {
            loopback_255: self.loopback_255,
            gi0_zero: self.gi0_zero,
        };
        params.pair_vrf = self.vrf.then(|| self.pair_vrf.clone());
        params.limits = config.limits;
        params.allow_oversubscribe = self.allow_oversubscribe;
        params.schema_version = self.cml_version;

        // hubs without the overlay shape still produce parameters so that
        // validation can name the conflict
        if self.mode == Shape::HubOverlay || !self.hubs.is_empty() {
            let defaults = OverlayParams::default();
            params.overlay = Some(OverlayParams {
                underlay: self.underlay,
                hubs: if self.hubs.is_empty() {
                    defaults.hubs
                } else {
                    self.hubs.clone()
                },
                phase: self.phase,
                security: self.security,
                psk: self.psk.clone(),
                tunnel_key: self.tunnel_key,
                nbma: self.nbma_cidr,
                tunnel: self.tunnel_cidr,
                eigrp_stub: self.eigrp_stub,
            });
        }

        params.ntp = self.ntp.map(|server| NtpParams {
            server,
            vrf: self.ntp_vrf.clone(),
        });

        if self.pki {
            let mut pki = PkiParams::from_config(config);
            if let Some(delay) = self.pki_ca_delay {
                pki.ca_delay = delay;
            }
            if let Some(delay) = self.pki_client_delay {
                pki.client_delay = delay;
            }
            pki.fingerprint = self.pki_fingerprint.clone();
            params.pki = Some(pki);
        }

        if self.mode == Shape::PartialMesh {
            params.mesh = Some(MeshParams {
                seed: self.mesh_seed,
                chord_probability: self.mesh_prob,
                max_degree: self.mesh_degree,
            });
        }

        // after the mesh, whose degree decides the first free slot
        if self.mgmt {
            let slot = self
                .mgmt_slot
                .unwrap_or_else(|| params.default_management_slot());
            params.management = Some(ManagementParams {
                cidr: self.mgmt_cidr,
                gateway: self.mgmt_gw,
                slot,
                vrf: self.mgmt_vrf.clone(),
            });
        }

        params
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    let mut logger = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = &args.loglevel {
        logger.parse_filters(level);
    }
    logger.init();

    if args.list_templates {
        for name in template::available() {
            println!("{name}");
        }
        return Ok(());
    }

    let config = config_loader::load_or_default(&args.config);
    if args.write {
        config_loader::save_config(&config, &args.config)?;
        return Ok(());
    }

    let params = args.to_params(&config);
    info!(
        "Generating {} lab with {} routers",
        params.shape, params.nodes
    );

    let mut emitter: Box<dyn Emitter> = match &args.offline_yaml {
        Some(path) => Box::new(OfflineEmitter::new(path, args.overwrite)),
        None => {
            // validate before logging in so that bad flags never reach the controller
            params.validate()?;
            let settings = ControllerSettings::from_env(args.ca.clone(), args.insecure)
                .wrap_err("controller settings are incomplete")?;
            let client = CmlClient::connect(&settings)
                .wrap_err_with(|| format!("failed to log in to {}", settings.url))?;
            let mut live = LiveEmitter::new(client);
            if let Some(path) = &args.yaml {
                live = live.with_export(path, args.overwrite);
            }
            if args.progress {
                live = live.with_observer(Box::new(LogProgress::default()));
            }
            Box::new(live)
        }
    };

    let report = orchestrator::generate_and_emit(&params, &config, &mut *emitter)?;
    info!(
        "Emitted {} nodes and {} links to {}",
        report.nodes, report.links, report.target
    );
    if let Some(path) = report.exported {
        info!("Lab exported to {:?}", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["topogen", "10"]);

        assert_eq!(args.nodes, Some(10));
        assert_eq!(args.mode, Shape::Star);
        assert_eq!(args.config, PathBuf::from("topogen.yaml"));
        assert_eq!(args.group_size, 20);
        assert!(args.offline_yaml.is_none());
    }

    #[test]
    fn test_mode_aliases() {
        let args = Args::parse_from(["topogen", "4", "--mode", "dmvpn"]);
        assert_eq!(args.mode, Shape::HubOverlay);
        let args = Args::parse_from(["topogen", "4", "-m", "flat-pair"]);
        assert_eq!(args.mode, Shape::PairedStar);
        let args = Args::parse_from(["topogen", "4", "-m", "nx"]);
        assert_eq!(args.mode, Shape::PartialMesh);
    }

    #[test]
    fn test_node_count_required_unless_listing() {
        assert!(Args::try_parse_from(["topogen"]).is_err());
        let args = Args::parse_from(["topogen", "--list-templates"]);
        assert!(args.list_templates);
    }

    #[test]
    fn test_overlay_params() {
        let args = Args::parse_from([
            "topogen", "63", "-m", "hub-overlay", "--hubs", "1,21,41", "--phase", "3",
            "--security", "psk", "--psk", "k3y",
        ]);
        let params = args.to_params(&Config::default());
        let overlay = params.overlay.as_ref().unwrap();
        assert_eq!(overlay.hubs, vec![1, 21, 41]);
        assert_eq!(overlay.phase, 3);
        assert_eq!(overlay.psk.as_deref(), Some("k3y"));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_hubs_on_star_are_rejected() {
        let args = Args::parse_from(["topogen", "10", "--hubs", "1"]);
        let params = args.to_params(&Config::default());
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_pki_delays_parsed() {
        let args = Args::parse_from([
            "topogen", "8", "--pki", "--pki-ca-delay", "1m", "--pki-client-delay", "3m",
        ]);
        let params = args.to_params(&Config::default());
        let pki = params.pki.as_ref().unwrap();
        assert_eq!(pki.ca_delay, Duration::from_secs(60));
        assert_eq!(pki.client_delay, Duration::from_secs(180));
    }

    #[test]
    fn test_management_flags_require_mgmt() {
        assert!(Args::try_parse_from(["topogen", "8", "--mgmt-slot", "6"]).is_err());
        let args = Args::parse_from(["topogen", "8", "--mgmt", "--mgmt-vrf", "Mgmt-vrf"]);
        let params = args.to_params(&Config::default());
        assert_eq!(params.management.unwrap().vrf.as_deref(), Some("Mgmt-vrf"));
    }

    #[test]
    fn test_management_slot_follows_mesh_degree() {
        let args = Args::parse_from(["topogen", "8", "-m", "partial-mesh", "--mgmt"]);
        let params = args.to_params(&Config::default());
        assert_eq!(params.management.as_ref().unwrap().slot, 6);
        assert!(params.validate().is_ok());

        let args = Args::parse_from(["topogen", "8", "--mgmt"]);
        assert_eq!(args.to_params(&Config::default()).management.unwrap().slot, 5);

        let args = Args::parse_from([
            "topogen", "8", "-m", "partial-mesh", "--mgmt", "--mgmt-slot", "4",
        ]);
        assert_eq!(args.to_params(&Config::default()).management.unwrap().slot, 4);
    }

    #[test]
    fn test_offline_conflicts_with_export() {
        assert!(Args::try_parse_from([
            "topogen", "8", "--offline-yaml", "a.yaml", "--yaml", "b.yaml",
        ])
        .is_err());
    }
}
