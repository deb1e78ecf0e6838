//! Generation orchestrator.
//!
//! Runs the pipeline in its fixed order: validate parameters, select
//! address pools, build the topology, plan capacity and layout, synthesize
//! configurations, and finally hand the result to an emitter. Every error
//! before the emitter is raised before anything is written or sent.

use log::{info, warn};

use crate::config::Config;
use crate::emit::{EmitReport, Emitter};
use crate::error::{ParameterError, TopogenError};
use crate::ip::AddressPlan;
use crate::params::{GenerationParams, Platform};
use crate::planner;
use crate::synth::{self, template, SynthesizedLab};
use crate::topology;

/// Build, plan and configure a lab without emitting it.
pub fn generate(params: &GenerationParams, config: &Config) -> Result<SynthesizedLab, TopogenError> {
    params.validate()?;
    let template = template::lookup(&params.template)
        .ok_or_else(|| ParameterError::UnknownTemplate(params.template.clone()))?;
    if params.platform != Platform::Iosv {
        warn!(
            "Using device template '{}'; capacity ceilings assume iosv and a 32-port unmanaged switch",
            params.platform.node_definition()
        );
    }

    let addresses = AddressPlan::new(params, config);
    let mut plan = topology::build(params, &addresses)?;
    let report = planner::plan(&mut plan, params)?;
    synth::synthesize(&mut plan, params, config, template.as_ref())?;

    info!(
        "Generated '{}': {} routers, {} switches, {} links",
        params.lab_name, report.routers, report.switches, report.links
    );
    Ok(SynthesizedLab {
        params: params.clone(),
        plan,
        report,
    })
}

/// Generate and emit in one go.
pub fn generate_and_emit(
    params: &GenerationParams,
    config: &Config,
    emitter: &mut dyn Emitter,
) -> Result<EmitReport, TopogenError> {
    let lab = generate(params, config)?;
    Ok(emitter.emit(&lab)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapacityError;
    use crate::params::Shape;

    #[test]
    fn test_generate_is_deterministic() {
        let params = GenerationParams::new(Shape::PartialMesh, 25);
        let config = Config::default();
        let a = generate(&params, &config).unwrap();
        let b = generate(&params, &config).unwrap();
        assert_eq!(a.plan, b.plan);
    }

    #[test]
    fn test_unknown_template_rejected() {
        let mut params = GenerationParams::new(Shape::Star, 4);
        params.template = "nxos".to_string();
        assert!(matches!(
            generate(&params, &Config::default()),
            Err(TopogenError::Parameter(ParameterError::UnknownTemplate(_)))
        ));
    }

    #[test]
    fn test_capacity_error_before_synthesis() {
        let mut params = GenerationParams::new(Shape::Star, 100);
        params.group_size = 50;
        assert!(matches!(
            generate(&params, &Config::default()),
            Err(TopogenError::Capacity(CapacityError::PortCeiling { .. }))
        ));
    }
}
