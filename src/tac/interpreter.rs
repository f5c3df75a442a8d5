//! A reference interpreter for TAC modules, used to check that optimisation
//! preserves the meaning of a program.

use std::collections::HashMap;

use thiserror::Error;

use super::{Decl, Instr, Label, Module, Name, Procedure, Value};
use crate::prelude::*;

/// The runtime helper which prints its single argument followed by a newline.
pub const PRINT_INT_HELPER: &str = "__bx_print_int";

/// Instructions executed before a run is abandoned.
pub const DEFAULT_FUEL: usize = 1_000_000;

const MAX_CALL_DEPTH: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpretError {
    #[error("call to unknown procedure '@{0}'")]
    UnknownProcedure(String),
    #[error("jump to unknown label '{label}' in @{procedure}")]
    UnknownLabel { procedure: String, label: Label },
    #[error("read of unassigned temporary '{0}'")]
    UnassignedTemporary(Name),
    #[error("read of undeclared global '{0}'")]
    UndeclaredGlobal(Name),
    #[error("division by zero")]
    DivisionByZero,
    #[error("conditional jump without a preceding comparison in @{0}")]
    NoComparison(String),
    #[error("@{callee} takes {expected} argument(s) but was called with {found}")]
    ArgumentMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },
    #[error("call to @{callee} expects arguments 1 to {argc}")]
    MissingArgument { callee: String, argc: usize },
    #[error("@{0} did not return a value")]
    MissingReturnValue(String),
    #[error("execution did not finish within {0} instructions")]
    OutOfFuel(usize),
    #[error("call depth exceeded {0}")]
    StackOverflow(usize),
}

/// The observable result of running a program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Execution {
    /// The value returned by the entry procedure.
    pub value: Option<i64>,
    /// Every integer printed through the print helper, in order.
    pub output: Vec<i64>,
    /// Final values of the globals.
    pub globals: Vec<(String, i64)>,
}

/// Run `@main` of a module.
pub fn run(module: &Module) -> Result<Execution, InterpretError> {
    run_with(module, "main", &[], DEFAULT_FUEL)
}

/// Run a single procedure on its own, without arguments.
pub fn run_procedure(proc: &Procedure) -> Result<Execution, InterpretError> {
    let module = Module::new(vec![Decl::Proc(proc.clone())]);
    run_with(&module, &proc.name, &[], DEFAULT_FUEL)
}

pub fn run_with(
    module: &Module,
    entry: &str,
    args: &[i64],
    fuel: usize,
) -> Result<Execution, InterpretError> {
    let mut interpreter = Interpreter {
        module,
        globals: module
            .globals()
            .map(|var| (var.name.clone(), var.init))
            .collect(),
        output: vec![],
        fuel,
        budget: fuel,
        depth: 0,
    };
    let value = interpreter.call(entry, args.to_vec())?;

    let mut globals: Vec<_> = interpreter.globals.into_iter().collect();
    globals.sort();
    Ok(Execution {
        value,
        output: interpreter.output,
        globals,
    })
}

struct Interpreter<'m> {
    module: &'m Module,
    globals: HashMap<String, i64>,
    output: Vec<i64>,
    fuel: usize,
    budget: usize,
    depth: usize,
}

/// The state of a single procedure activation.
struct Frame<'p> {
    proc: &'p Procedure,
    temps: HashMap<&'p str, i64>,
    labels: HashMap<&'p Label, usize>,
    flags: Option<(i64, i64)>,
    args: Vec<(usize, i64)>,
}

impl<'m> Interpreter<'m> {
    fn call(&mut self, name: &str, args: Vec<i64>) -> Result<Option<i64>, InterpretError> {
        if name == PRINT_INT_HELPER {
            let [value] = args.as_slice() else {
                return Err(InterpretError::ArgumentMismatch {
                    callee: name.to_string(),
                    expected: 1,
                    found: args.len(),
                });
            };
            self.output.push(*value);
            return Ok(None);
        }

        let module = self.module;
        let proc = module
            .procedure(name)
            .ok_or_else(|| InterpretError::UnknownProcedure(name.to_string()))?;
        if proc.params.len() != args.len() {
            return Err(InterpretError::ArgumentMismatch {
                callee: name.to_string(),
                expected: proc.params.len(),
                found: args.len(),
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(InterpretError::StackOverflow(MAX_CALL_DEPTH));
        }

        let mut frame = Frame {
            proc,
            temps: HashMap::new(),
            labels: proc
                .body
                .iter()
                .enumerate()
                .filter_map(|(pos, instr)| instr.as_label().map(|lbl| (lbl, pos)))
                .collect(),
            flags: None,
            args: vec![],
        };
        for (param, arg) in proc.params.iter().zip(args) {
            if let Name::Temp(temp) = param {
                frame.temps.insert(temp, arg);
            }
        }

        self.depth += 1;
        let result = self.execute(&mut frame);
        self.depth -= 1;
        result
    }

    fn execute<'p>(&mut self, frame: &mut Frame<'p>) -> Result<Option<i64>, InterpretError> {
        let proc: &'p Procedure = frame.proc;
        let body = &proc.body;
        let mut pc = 0;
        while let Some(instr) = body.get(pc) {
            if self.fuel == 0 {
                return Err(InterpretError::OutOfFuel(self.budget));
            }
            self.fuel -= 1;
            pc += 1;

            match instr {
                Instr::Const(dest, value) => self.store(frame, dest, *value),
                Instr::Copy(dest, value) => {
                    let value = self.load(frame, value)?;
                    self.store(frame, dest, value);
                }
                Instr::Bin(dest, op, lhs, rhs) => {
                    let (lhs, rhs) = (self.load(frame, lhs)?, self.load(frame, rhs)?);
                    let result = op
                        .evaluate(lhs, rhs)
                        .ok_or(InterpretError::DivisionByZero)?;
                    self.store(frame, dest, result);
                }
                Instr::Un(dest, op, value) => {
                    let value = self.load(frame, value)?;
                    self.store(frame, dest, op.evaluate(value));
                }
                Instr::Cmp(lhs, rhs) => {
                    frame.flags = Some((self.load(frame, lhs)?, self.load(frame, rhs)?));
                }
                Instr::Jmp(label) => pc = self.target(frame, label)?,
                Instr::CondJmp(op, label) => {
                    let (lhs, rhs) = frame
                        .flags
                        .ok_or_else(|| InterpretError::NoComparison(frame.proc.name.clone()))?;
                    if op.holds(lhs, rhs) {
                        pc = self.target(frame, label)?;
                    }
                }
                Instr::Label(_) | Instr::Nop => {}
                Instr::Ret(value) => {
                    return value.as_ref().map(|v| self.load(frame, v)).transpose();
                }
                Instr::Param(index, value) => {
                    let value = self.load(frame, value)?;
                    frame.args.push((*index, value));
                }
                Instr::Call(dest, callee, argc) => {
                    let args = take_arguments(frame, callee, *argc)?;
                    let result = self.call(callee, args)?;
                    if let Some(dest) = dest {
                        let value = result
                            .ok_or_else(|| InterpretError::MissingReturnValue(callee.clone()))?;
                        self.store(frame, dest, value);
                    }
                }
            }
        }
        Ok(None)
    }

    fn target(&self, frame: &Frame, label: &Label) -> Result<usize, InterpretError> {
        frame
            .labels
            .get(label)
            .copied()
            .ok_or_else(|| InterpretError::UnknownLabel {
                procedure: frame.proc.name.clone(),
                label: label.clone(),
            })
    }

    fn load(&self, frame: &Frame, value: &Value) -> Result<i64, InterpretError> {
        match value {
            Value::Const(literal) => Ok(*literal),
            Value::Name(name @ Name::Temp(temp)) => frame
                .temps
                .get(temp.as_str())
                .copied()
                .ok_or_else(|| InterpretError::UnassignedTemporary(name.clone())),
            Value::Name(name @ Name::Global(global)) => self
                .globals
                .get(global)
                .copied()
                .ok_or_else(|| InterpretError::UndeclaredGlobal(name.clone())),
        }
    }

    fn store<'p>(&mut self, frame: &mut Frame<'p>, dest: &'p Name, value: i64) {
        match dest {
            Name::Temp(temp) => {
                frame.temps.insert(temp, value);
            }
            Name::Global(global) => {
                trace!("@{} <- {}", global, value);
                self.globals.insert(global.clone(), value);
            }
        }
    }
}

/// Pop the arguments of a call with `argc` arguments off the pending
/// parameter list. Parameters pass in any order, but must be numbered 1 to `argc`.
fn take_arguments(frame: &mut Frame, callee: &str, argc: usize) -> Result<Vec<i64>, InterpretError> {
    let missing = || InterpretError::MissingArgument {
        callee: callee.to_string(),
        argc,
    };
    let start = frame.args.len().checked_sub(argc).ok_or_else(missing)?;
    let mut args = frame.args.split_off(start);
    args.sort_by_key(|(index, _)| *index);
    if args.iter().enumerate().any(|(pos, (index, _))| *index != pos + 1) {
        return Err(missing());
    }
    Ok(args.into_iter().map(|(_, value)| value).collect())
}
