//! Offline lab YAML backend.

use std::path::PathBuf;

use log::info;

use crate::emit::lab_yaml::LabDocument;
use crate::emit::{check_target, write_artifact, EmitReport, Emitter};
use crate::error::EmissionError;
use crate::synth::SynthesizedLab;

#[derive(Debug, Clone)]
pub struct OfflineEmitter {
    pub path: PathBuf,
    pub overwrite: bool,
}

impl OfflineEmitter {
    pub fn new(path: impl Into<PathBuf>, overwrite: bool) -> Self {
        OfflineEmitter {
            path: path.into(),
            overwrite,
        }
    }

    /// Serialize without touching the filesystem.
    pub fn render(lab: &SynthesizedLab) -> Result<String, EmissionError> {
        LabDocument::from_lab(lab, "offline YAML")?.to_yaml()
    }
}

impl Emitter for OfflineEmitter {
    fn emit(&mut self, lab: &SynthesizedLab) -> Result<EmitReport, EmissionError> {
        check_target(&self.path, self.overwrite)?;
        let document = LabDocument::from_lab(lab, "offline YAML")?;
        let yaml = document.to_yaml()?;
        write_artifact(&self.path, &yaml, self.overwrite)?;
        info!("Offline YAML written to {}", self.path.display());
        Ok(EmitReport {
            target: self.path.display().to_string(),
            nodes: document.nodes.len(),
            links: document.links.len(),
            exported: None,
        })
    }
}
