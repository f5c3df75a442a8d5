//! Target code generation.
mod amd64;

use std::path::Path;

use thiserror::Error;

use crate::{error::CompileError, prelude::*, tac::Module, tac::Name};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerError {
    #[error("reference to undeclared global '@{0}'")]
    UndeclaredGlobal(String),
    #[error("parameter '{0}' must be a temporary")]
    InvalidParameter(Name),
    #[error("call to @{callee} is not preceded by arguments 1 to {argc}")]
    MissingArgument { callee: String, argc: usize },
    #[error("symbol '{0}' is declared more than once")]
    DuplicateSymbol(String),
}

/// Lower a module to x86-64 assembly for Linux, in AT&T syntax.
pub fn generate_assembly(module: &Module) -> Result<String, CompileError> {
    let assembly = amd64::linux::compile(module)?;
    Ok(assembly.to_string())
}

/// Lower a module and write the assembly to `asm_path`.
pub fn write_assembly<P: AsRef<Path>>(module: &Module, asm_path: P) -> Result<()> {
    let assembly = generate_assembly(module)?;
    std::fs::write(&asm_path, assembly)
        .with_context(|| format!("Could not write {}", asm_path.as_ref().display()))?;
    info!("Wrote assembly to {}", asm_path.as_ref().display());
    Ok(())
}
