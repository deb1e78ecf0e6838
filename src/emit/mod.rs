//! Artifact emitters.
//!
//! Both backends consume the same [`SynthesizedLab`]: the offline emitter
//! writes a CML lab YAML document, the live emitter replays the plan
//! against a [`LabController`].

pub mod controller;
pub mod lab_yaml;
pub mod live;
pub mod offline;

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::EmissionError;
use crate::synth::SynthesizedLab;

pub use controller::{CmlClient, ControllerError, ControllerSettings, LabController, NodeRequest};
pub use lab_yaml::LabDocument;
pub use live::{LiveEmitter, LogProgress, ProgressObserver};
pub use offline::OfflineEmitter;

/// What an emitter produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmitReport {
    /// File written, or the controller lab id.
    pub target: String,
    pub nodes: usize,
    pub links: usize,
    pub exported: Option<PathBuf>,
}

pub trait Emitter {
    fn emit(&mut self, lab: &SynthesizedLab) -> Result<EmitReport, EmissionError>;
}

/// Refuse an existing `path` unless `overwrite` is set.
pub fn check_target(path: &Path, overwrite: bool) -> Result<(), EmissionError> {
    if path.exists() && !overwrite {
        return Err(EmissionError::TargetExists {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Write `contents` to `path`, creating parent directories. An existing
/// file is only replaced with `overwrite`, and then with a warning.
pub fn write_artifact(path: &Path, contents: &str, overwrite: bool) -> Result<(), EmissionError> {
    check_target(path, overwrite)?;
    let io_err = |source| EmissionError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    if path.exists() {
        warn!("Overwriting existing file {}", path.display());
    }
    fs::write(path, contents).map_err(io_err)
}
