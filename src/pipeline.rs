//! The per-procedure optimisation pipeline: copy propagation, then the
//! control-flow graph round trip.
use crate::{
    cfg::{build_blocks, build_graph, linearize, optimise, OptimiserConfig, OptimiserReport},
    error::{AddStage, CompileError, Stage},
    prelude::*,
    tac::{propagate_copies, Module, Procedure},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Run the control-flow graph optimiser. When disabled, procedures are
    /// still split into blocks and linearised, so labels are normalised.
    pub optimise: bool,
    pub copy_propagation: bool,
    pub optimiser: OptimiserConfig,
}
impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            optimise: true,
            copy_propagation: true,
            optimiser: OptimiserConfig::default(),
        }
    }
}

/// Optimise every procedure of a module in place. Procedures are handled
/// independently; the first failure aborts the whole module.
pub fn optimise_module(module: &mut Module, config: &PipelineConfig) -> Result<(), CompileError> {
    let before: usize = module.procedures().map(|proc| proc.body.len()).sum();
    for proc in module.procedures_mut() {
        optimise_procedure(proc, config)?;
    }
    let after: usize = module.procedures().map(|proc| proc.body.len()).sum();
    info!("Optimised module from {} to {} instructions", before, after);
    Ok(())
}

pub fn optimise_procedure(
    proc: &mut Procedure,
    config: &PipelineConfig,
) -> Result<OptimiserReport, CompileError> {
    if config.copy_propagation {
        propagate_copies(proc);
    }

    let body = std::mem::take(&mut proc.body);
    let mut cfg = build_blocks(body).at_stage(Stage::BlockBuilding, &proc.name)?;
    build_graph(&mut cfg).at_stage(Stage::GraphConstruction, &proc.name)?;

    let report = if config.optimise {
        let report = optimise(&mut cfg, &config.optimiser).at_stage(Stage::Optimisation, &proc.name)?;
        debug!(
            "@{}: {} rewrite(s) in {} cycle(s), {} dead store(s)",
            proc.name, report.rewrites, report.cycles, report.dead_stores
        );
        report
    } else {
        OptimiserReport::default()
    };

    proc.body = linearize(cfg).at_stage(Stage::Linearisation, &proc.name)?;
    Ok(report)
}
