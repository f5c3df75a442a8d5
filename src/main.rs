use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::Parser;

use crate::{
    commandline::{BackendOptions, Operation, Options},
    error::{CompileError, Stage},
    prelude::*,
    tac::{interpreter, Module},
};

mod cfg;
mod codegen;
mod commandline;
mod error;
mod ext;
mod pipeline;
mod prelude;
mod tac;

fn main() -> Result<()> {
    let options = Options::parse();

    stderrlog::new()
        .module(module_path!())
        .quiet(options.quiet)
        .verbosity(options.verbose as usize + 1)
        .init()?;

    match options.operation {
        Operation::Optimise { file, backend } => {
            let module = load_optimised(&file, &backend)?;
            let out = backend
                .output
                .unwrap_or_else(|| output_path(&file, "opt.tac.json"));
            let json = tac::store_module(&module)
                .map_err(|err| CompileError::new(Stage::Loading, None, err))?;
            fs::write(&out, json).with_context(|| format!("Could not write {}", out.display()))?;
            info!("Wrote optimised program to {}", out.display());
        }
        Operation::Compile { file, backend } => {
            let module = load_optimised(&file, &backend)?;
            let out = backend.output.unwrap_or_else(|| output_path(&file, "s"));
            codegen::write_assembly(&module, out)?;
        }
        Operation::Run { file, backend } => {
            let module = load_optimised(&file, &backend)?;
            let execution = interpreter::run(&module)
                .map_err(|err| CompileError::new(Stage::Interpretation, Some("main".to_string()), err))?;
            for value in &execution.output {
                println!("{}", value);
            }
            if let Some(value) = execution.value {
                info!("@main returned {}", value);
            }
        }
    }

    Ok(())
}

fn load_optimised(file: &Path, backend: &BackendOptions) -> Result<Module> {
    let source =
        fs::read_to_string(file).with_context(|| format!("Could not read {}", file.display()))?;
    let mut module = tac::load_module(&source)
        .map_err(|err| CompileError::new(Stage::Loading, None, err))
        .with_context(|| format!("Could not load {}", file.display()))?;
    debug!(
        "Loaded {} procedure(s) and {} global(s)",
        module.procedures().count(),
        module.globals().count()
    );

    pipeline::optimise_module(&mut module, &backend.pipeline())?;
    Ok(module)
}

/// Place the output next to the input, replacing the TAC extensions.
fn output_path(input: &Path, extension: &str) -> PathBuf {
    let name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".tac.json")
        .or_else(|| name.strip_suffix(".json"))
        .unwrap_or(&name);
    input.with_file_name(format!("{}.{}", stem, extension))
}
