//! Live controller backend.
//!
//! Replays a plan in dependency order: lab, switches, other nodes (each
//! with its interfaces), links, then configurations. A failed creation
//! call stops the run, since every later call would reference something
//! that does not exist. Configuration pushes are independent of each
//! other, so all of them are attempted and their failures reported
//! together. Nothing already created is removed.

use std::collections::HashMap;
use std::path::PathBuf;

use log::{debug, info, warn};

use crate::emit::controller::{ControllerError, LabController, NodeRequest};
use crate::emit::lab_yaml::{self, LabDocument, SWITCH_DEFINITION};
use crate::emit::{check_target, write_artifact, EmitReport, Emitter};
use crate::error::EmissionError;
use crate::synth::SynthesizedLab;
use crate::topology::Endpoint;

/// Passive observer told about every completed controller call.
pub trait ProgressObserver {
    fn step(&mut self, step: &str, completed: usize, total: usize);
}

/// Logs progress at debug level, and every tenth of the way at info.
#[derive(Debug, Default)]
pub struct LogProgress {
    last_decile: usize,
}

impl ProgressObserver for LogProgress {
    fn step(&mut self, step: &str, completed: usize, total: usize) {
        debug!("[{completed}/{total}] {step}");
        let decile = completed * 10 / total.max(1);
        if decile > self.last_decile {
            self.last_decile = decile;
            info!("Progress: {}% ({completed}/{total} calls)", decile * 10);
        }
    }
}

pub struct LiveEmitter<C: LabController> {
    controller: C,
    export: Option<PathBuf>,
    overwrite: bool,
    observer: Option<Box<dyn ProgressObserver>>,
    completed: usize,
    total: usize,
}

impl<C: LabController> LiveEmitter<C> {
    pub fn new(controller: C) -> Self {
        LiveEmitter {
            controller,
            export: None,
            overwrite: false,
            observer: None,
            completed: 0,
            total: 0,
        }
    }

    /// Download the created lab to `path` when done.
    pub fn with_export(mut self, path: impl Into<PathBuf>, overwrite: bool) -> Self {
        self.export = Some(path.into());
        self.overwrite = overwrite;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn into_controller(self) -> C {
        self.controller
    }

    /// Run one creation call, turning a failure into a stop.
    fn create<T>(
        &mut self,
        step: String,
        call: impl FnOnce(&mut C) -> Result<T, ControllerError>,
    ) -> Result<T, EmissionError> {
        match call(&mut self.controller) {
            Ok(value) => {
                self.completed += 1;
                if let Some(observer) = self.observer.as_mut() {
                    observer.step(&step, self.completed, self.total);
                }
                Ok(value)
            }
            Err(source) => Err(EmissionError::Controller {
                step,
                completed: self.completed,
                source,
            }),
        }
    }
}

impl<C: LabController> Emitter for LiveEmitter<C> {
    fn emit(&mut self, lab: &SynthesizedLab) -> Result<EmitReport, EmissionError> {
        if let Some(path) = &self.export {
            check_target(path, self.overwrite)?;
        }

        let document = LabDocument::from_lab(lab, "live")?;
        let plan = &lab.plan;
        let configured = plan.nodes.iter().filter(|n| n.configuration().is_some()).count();
        self.completed = 0;
        self.total = 1
            + document.nodes.len()
            + document.nodes.iter().map(|n| n.interfaces.len()).sum::<usize>()
            + document.links.len()
            + configured
            + usize::from(self.export.is_some());

        let lab_id = self.create(format!("create lab '{}'", document.lab.title), |c| {
            c.create_lab(&document.lab.title, &document.lab.description, &document.lab.notes)
        })?;
        info!("Created lab {lab_id}");

        let mut switch_ids = Vec::with_capacity(plan.switches.len());
        let mut interface_ids: HashMap<Endpoint, String> = HashMap::new();
        for (idx, switch) in plan.switches.iter().enumerate() {
            let request = NodeRequest {
                label: switch.label.clone(),
                node_definition: SWITCH_DEFINITION.to_string(),
                x: switch.position.x,
                y: switch.position.y,
                tags: Vec::new(),
                hide_links: switch.hide_links,
            };
            let id = self.create(format!("create switch {}", switch.label), |c| {
                c.create_node(&lab_id, &request)
            })?;
            for port in 0..switch.port_count() {
                let iface = self.create(format!("create {} port{port}", switch.label), |c| {
                    c.create_interface(&lab_id, &id, port)
                })?;
                interface_ids.insert(Endpoint::Switch { switch: idx, port }, iface);
            }
            switch_ids.push(id);
        }
        info!("Created {} switches", switch_ids.len());

        let mut node_ids = Vec::with_capacity(plan.nodes.len());
        for (idx, node) in plan.nodes.iter().enumerate() {
            let request = NodeRequest {
                label: node.label.clone(),
                node_definition: node.definition.clone(),
                x: node.position.x,
                y: node.position.y,
                tags: lab_yaml::node_tags(node),
                hide_links: false,
            };
            let id = self.create(format!("create node {}", node.label), |c| {
                c.create_node(&lab_id, &request)
            })?;
            for iface in node.physical_interfaces() {
                let slot = iface.slot;
                let iface_id = self.create(format!("create {} slot {slot}", node.label), |c| {
                    c.create_interface(&lab_id, &id, slot)
                })?;
                interface_ids.insert(Endpoint::Node { node: idx, slot }, iface_id);
            }
            node_ids.push(id);
        }
        info!("Created {} nodes", node_ids.len());

        for link in &plan.links {
            let step = format!("link {} <-> {}", plan.describe(&link.a), plan.describe(&link.b));
            let (a, b) = match (interface_ids.get(&link.a), interface_ids.get(&link.b)) {
                (Some(a), Some(b)) => (a.clone(), b.clone()),
                _ => {
                    return Err(EmissionError::Controller {
                        step,
                        completed: self.completed,
                        source: ControllerError::Unexpected {
                            endpoint: "links".to_string(),
                            reason: "link endpoint has no interface".to_string(),
                        },
                    })
                }
            };
            self.create(step, |c| c.create_link(&lab_id, &a, &b))?;
        }
        info!("Created {} links", plan.links.len());

        let mut failures = Vec::new();
        for (node, id) in plan.nodes.iter().zip(&node_ids) {
            let Some(configuration) = node.configuration() else {
                continue;
            };
            match self.controller.set_configuration(&lab_id, id, configuration) {
                Ok(()) => {
                    self.completed += 1;
                    if let Some(observer) = self.observer.as_mut() {
                        observer.step(&format!("configure {}", node.label), self.completed, self.total);
                    }
                }
                Err(err) => {
                    warn!("Configuration push for {} failed: {err}", node.label);
                    failures.push((node.label.clone(), err));
                }
            }
        }
        if !failures.is_empty() {
            return Err(EmissionError::Configuration { failures });
        }
        info!("Pushed {configured} configurations");

        let exported = match self.export.clone() {
            Some(path) => {
                let yaml = self.create(format!("export lab {lab_id}"), |c| c.export_lab(&lab_id))?;
                write_artifact(&path, &yaml, self.overwrite)?;
                info!("Exported lab YAML to {}", path.display());
                Some(path)
            }
            None => None,
        };

        Ok(EmitReport {
            target: lab_id,
            nodes: document.nodes.len(),
            links: document.links.len(),
            exported,
        })
    }
}
