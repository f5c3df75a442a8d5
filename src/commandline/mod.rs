use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{cfg::OptimiserConfig, pipeline::PipelineConfig};

#[derive(Debug, Parser)]
#[clap(about = "An optimising backend for three-address code")]
pub struct Options {
    #[clap(subcommand)]
    pub operation: Operation,
    /// Increase logging verbosity, may be repeated
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Only report errors
    #[clap(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Operation {
    /// Optimise a TAC program and write it back as JSON
    Optimise {
        file: PathBuf,
        #[clap(flatten)]
        backend: BackendOptions,
    },
    /// Compile a TAC program to x86-64 assembly
    Compile {
        file: PathBuf,
        #[clap(flatten)]
        backend: BackendOptions,
    },
    /// Optimise and interpret a TAC program
    Run {
        file: PathBuf,
        #[clap(flatten)]
        backend: BackendOptions,
    },
}

#[derive(Debug, Args)]
pub struct BackendOptions {
    /// Write the output here instead of next to the input
    #[clap(short, long)]
    pub output: Option<PathBuf>,
    /// Do not optimise the control-flow graph
    #[clap(long)]
    no_optimise: bool,
    /// Do not propagate copies before building the control-flow graph
    #[clap(long)]
    no_copy_propagation: bool,
    /// Keep stores to temporaries that are never read
    #[clap(long)]
    no_dead_store_elimination: bool,
    /// Upper bound on the number of simplification rounds
    #[clap(long, default_value_t = OptimiserConfig::default().max_cycles)]
    max_cycles: usize,
}

impl BackendOptions {
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            optimise: !self.no_optimise,
            copy_propagation: !self.no_copy_propagation,
            optimiser: OptimiserConfig {
                max_cycles: self.max_cycles,
                dead_store_elimination: !self.no_dead_store_elimination,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Options {
        Options::try_parse_from(args).unwrap()
    }

    #[test]
    fn defaults_enable_every_pass() {
        let options = parse(&["bxopt", "compile", "prog.tac.json"]);

        let Operation::Compile { file, backend } = options.operation else {
            panic!("expected compile");
        };
        assert_eq!(PathBuf::from("prog.tac.json"), file);
        assert_eq!(None, backend.output);
        assert_eq!(PipelineConfig::default(), backend.pipeline());
        assert_eq!(0, options.verbose);
    }

    #[test]
    fn flags_switch_passes_off() {
        let options = parse(&[
            "bxopt",
            "-vv",
            "optimise",
            "prog.tac.json",
            "--no-copy-propagation",
            "--no-dead-store-elimination",
            "--max-cycles",
            "3",
            "-o",
            "out.json",
        ]);

        let Operation::Optimise { backend, .. } = options.operation else {
            panic!("expected optimise");
        };
        let pipeline = backend.pipeline();
        assert_eq!(2, options.verbose);
        assert!(pipeline.optimise);
        assert!(!pipeline.copy_propagation);
        assert!(!pipeline.optimiser.dead_store_elimination);
        assert_eq!(3, pipeline.optimiser.max_cycles);
        assert_eq!(Some(PathBuf::from("out.json")), backend.output);
    }
}
