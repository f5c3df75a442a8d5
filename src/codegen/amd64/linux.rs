//! Native code generation for 64-bit Linux.

use std::collections::HashSet;

use super::{
    assembly::*, procedure_compiler::ProcedureCompiler, stack_convention, x86::*,
};
use crate::{
    codegen::LowerError,
    error::{AddStage, CompileError, Stage},
    prelude::*,
    tac::{interpreter::PRINT_INT_HELPER, Module, Name, EXCEPTION_CELL},
};

use Op::*;
use Operand::*;
use Register::*;

/// The `printf` format used by the print helper.
const PRINT_FORMAT: &str = ".lprintfmt";

pub fn compile(module: &Module) -> Result<Assembly, CompileError> {
    let mut asm = Assembly::new();
    let globals = declare_globals(module, &mut asm.data).map_err(lowering_error)?;

    let mut symbols: HashSet<&str> = globals.iter().map(String::as_str).collect();
    symbols.insert(PRINT_INT_HELPER);
    for proc in module.procedures() {
        if !symbols.insert(&proc.name) {
            return Err(lowering_error(LowerError::DuplicateSymbol(proc.name.clone())));
        }
        debug!("Lowering @{}", proc.name);
        let lowered = ProcedureCompiler::compile(proc, &globals).at_stage(Stage::Lowering, &proc.name)?;
        asm.text.procedures.push(lowered);
    }

    asm.text.procedures.push(print_helper());
    asm.rodata.string(PRINT_FORMAT, "%ld\\n");

    Ok(asm)
}

fn lowering_error(error: LowerError) -> CompileError {
    CompileError::new(Stage::Lowering, None, error)
}

/// Emit a data cell for every global variable. The exception cell is
/// declared on demand when the module uses it without declaring it.
fn declare_globals(module: &Module, data: &mut Data) -> Result<HashSet<String>, LowerError> {
    let mut globals = HashSet::new();
    for var in module.globals() {
        if !globals.insert(var.name.clone()) {
            return Err(LowerError::DuplicateSymbol(var.name.clone()));
        }
        data.quad(var.name.clone(), var.init);
    }

    let exception = Name::global(EXCEPTION_CELL);
    let uses_exception = module
        .procedures()
        .flat_map(|proc| &proc.body)
        .any(|instr| instr.reads_from_name(&exception) || instr.write() == Some(&exception));
    if uses_exception && globals.insert(EXCEPTION_CELL.to_string()) {
        trace!("Declaring @{}", EXCEPTION_CELL);
        data.quad(EXCEPTION_CELL, 0);
    }
    Ok(globals)
}

/// Prints the integer in `rdi` on its own line.
fn print_helper() -> Procedure {
    let mut print = Procedure::new(
        PRINT_INT_HELPER,
        stack_convention::prologue(0),
        stack_convention::epilogue(super::procedure_compiler::exit_label(PRINT_INT_HELPER)),
    );
    print
        .body
        .push(Movq, [Reg(Rdi), Reg(Rsi)])
        .push(Leaq, [Rip(PRINT_FORMAT.to_string()), Reg(Rdi)])
        .push_cmt(Xorq, [Reg(Rax), Reg(Rax)], "no vector arguments")
        .push(Callq, [Sym("printf".to_string())]);
    print
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{error::ErrorKind, tac::load_module};

    fn module(document: serde_json::Value) -> Module {
        load_module(&document.to_string()).unwrap()
    }

    #[test]
    fn module_layout() {
        let module = module(json!([
            {"var": "@total", "init": 3},
            {"proc": "@main", "body": [
                {"opcode": "param", "args": [1, "@total"]},
                {"opcode": "call", "args": ["@__bx_print_int", 1]},
                {"opcode": "ret", "args": [0]}
            ]}
        ]));

        let text = compile(&module).unwrap().to_string();

        assert!(text.contains(".lprintfmt:\n    .string \"%ld\\n\"\n"));
        assert!(text.contains("    .globl  total\ntotal:\n    .quad   3\n"));
        assert!(text.contains("    .globl  main\nmain:\n"));
        assert!(text.contains("callq   __bx_print_int"));
        assert!(text.contains(".E_main:\n"));
        assert!(!text.contains("exception"));
    }

    #[test]
    fn exception_cell_is_declared_on_use() {
        let module = module(json!([
            {"proc": "@main", "body": [
                {"opcode": "call", "args": ["@f", 0]},
                {"opcode": "const", "args": [0], "result": "%0"},
                {"opcode": "cmpq", "args": ["%0", "@exception"]},
                {"opcode": "jz", "args": [1]},
                {"opcode": "ret", "args": [1]},
                {"opcode": "label", "args": [1]},
                {"opcode": "ret", "args": [0]}
            ]},
            {"proc": "@f", "body": [{"opcode": "ret"}]}
        ]));

        let text = compile(&module).unwrap().to_string();

        assert!(text.contains("exception:\n    .quad   0\n"));
        assert!(text.contains("exception(%rip)"));
        assert!(text.contains(".Lmain.1:"));
    }

    #[test]
    fn lowering_errors_name_the_procedure() {
        let module = module(json!([
            {"proc": "@main", "body": [{"opcode": "ret", "args": ["@missing"]}]}
        ]));

        let error = compile(&module).err().unwrap();

        assert_eq!(Stage::Lowering, error.stage());
        assert!(matches!(error.kind(), ErrorKind::Lower(LowerError::UndeclaredGlobal(_))));
        assert_eq!(
            "lowering failed in @main: reference to undeclared global '@missing'",
            error.to_string()
        );
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let module = module(json!([
            {"var": "@main", "init": 0},
            {"proc": "@main", "body": [{"opcode": "ret"}]}
        ]));

        assert!(matches!(
            compile(&module).err().unwrap().kind(),
            ErrorKind::Lower(LowerError::DuplicateSymbol(name)) if name == "main"
        ));
    }
}
