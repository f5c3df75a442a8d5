use std::collections::HashSet;

use super::{
    assembly::{Block, Operand, Procedure},
    calling_convention::{self, RETURN_REGISTER},
    stack_convention::{self, StackFrame},
    x86::*,
};
use crate::{
    codegen::LowerError,
    prelude::*,
    tac::{self, BinOp, Instr, Label, Name, Value},
};

use Op::*;
use Operand::*;
use Register::*;

/// Lowers one TAC procedure. Every temporary lives in its own stack slot;
/// instructions load their operands into scratch registers, compute, and
/// store the result straight back.
pub struct ProcedureCompiler<'m> {
    proc: &'m tac::Procedure,
    globals: &'m HashSet<String>,
    frame: StackFrame,
    body: Block,
    /// Arguments passed by `param` but not yet consumed by a call, with their
    /// 1-based index and the slot holding their value.
    arg_stack: Vec<(usize, Operand)>,
}
impl<'m> ProcedureCompiler<'m> {
    /// Compile the given procedure. `globals` names every data cell the
    /// procedure may refer to.
    pub fn compile(
        proc: &'m tac::Procedure,
        globals: &'m HashSet<String>,
    ) -> Result<Procedure, LowerError> {
        let mut compiler = Self {
            proc,
            globals,
            frame: StackFrame::new(),
            body: Block::new(),
            arg_stack: vec![],
        };

        let spills = compiler.bind_params()?;
        for instr in &proc.body {
            compiler.compile_instr(instr)?;
        }
        if !compiler.arg_stack.is_empty() {
            warn!(
                "@{}: {} argument(s) passed without a following call",
                proc.name,
                compiler.arg_stack.len()
            );
        }

        let mut prologue = stack_convention::prologue(compiler.frame.size());
        prologue.append(spills);
        let epilogue = stack_convention::epilogue(exit_label(&proc.name));
        let mut procedure = Procedure::new(proc.name.clone(), prologue, epilogue);
        procedure.body = compiler.body;
        Ok(procedure)
    }

    /// Give every parameter its home: register arguments are spilled to a
    /// slot, stack arguments are used where the caller left them.
    fn bind_params(&mut self) -> Result<Block, LowerError> {
        let mut spills = Block::new();
        for (position, param) in self.proc.params.iter().enumerate() {
            let Name::Temp(temp) = param else {
                return Err(LowerError::InvalidParameter(param.clone()));
            };
            match calling_convention::param_register(position) {
                Some(reg) => {
                    let slot = self.frame.slot(temp);
                    spills.push_cmt(Movq, [Reg(reg), slot], format!("spill {}", param));
                }
                None => self
                    .frame
                    .bind_incoming(temp, calling_convention::stack_param_offset(position)),
            }
        }
        Ok(spills)
    }

    /// Compile a single TAC instruction.
    fn compile_instr(&mut self, instr: &Instr) -> Result<(), LowerError> {
        let comment = instr.to_string();
        match instr {
            Instr::Const(target, value) => {
                let target = self.location(target)?;
                let value = Imm(*value);
                if value.is_wide_imm() {
                    self.emit_cmt(Movq, [value, Reg(R11)], comment);
                    self.emit(Movq, [Reg(R11), target]);
                } else {
                    self.emit_cmt(Movq, [value, target], comment);
                }
            }
            Instr::Copy(target, value) => {
                self.load(value, R11, Some(comment))?;
                self.store(R11, target)?;
            }
            Instr::Bin(target, op, lhs, rhs) => self.compile_bin(target, *op, lhs, rhs, comment)?,
            Instr::Un(target, op, value) => {
                self.load(value, R11, Some(comment))?;
                self.emit(Op::unary(*op), [Reg(R11)]);
                self.store(R11, target)?;
            }
            Instr::Cmp(lhs, rhs) => {
                self.load(lhs, R10, Some(comment))?;
                self.load(rhs, R11, None)?;
                self.emit(Cmpq, [Reg(R11), Reg(R10)]);
            }
            Instr::Jmp(label) => {
                let target = self.jump_label(label);
                self.emit_cmt(Jmp, [Sym(target)], comment);
            }
            Instr::CondJmp(op, label) => {
                let target = self.jump_label(label);
                self.emit_cmt(Op::jump_for(*op), [Sym(target)], comment);
            }
            Instr::Label(label) => {
                let label = self.jump_label(label);
                self.body.label(label);
            }
            Instr::Ret(value) => {
                if let Some(value) = value {
                    self.load(value, RETURN_REGISTER, Some(comment))?;
                } else {
                    self.body.comment(comment);
                }
                self.emit(Jmp, [Sym(exit_label(&self.proc.name))]);
            }
            Instr::Param(index, value) => self.compile_param(*index, value, comment)?,
            Instr::Call(target, callee, argc) => self.compile_call(target.as_ref(), callee, *argc)?,
            Instr::Nop => {}
        }
        Ok(())
    }

    fn compile_bin(
        &mut self,
        target: &Name,
        op: BinOp,
        lhs: &Value,
        rhs: &Value,
        comment: String,
    ) -> Result<(), LowerError> {
        match op {
            BinOp::Mul | BinOp::Div | BinOp::Mod => {
                self.load(lhs, Rax, Some(comment))?;
                // One-operand forms take no immediate.
                let divisor = self.register_or_memory(rhs, R10)?;
                if op == BinOp::Mul {
                    self.emit(Imulq, [divisor]);
                } else {
                    self.emit(Cqto, []);
                    self.emit(Idivq, [divisor]);
                }
                let result = if op == BinOp::Mod { Rdx } else { Rax };
                self.store(result, target)
            }
            BinOp::Shl | BinOp::Shr => {
                self.load(lhs, R11, Some(comment))?;
                self.load(rhs, Rcx, None)?;
                if let Some(shift) = Op::accumulating(op) {
                    self.emit(shift, [Reg(Cl), Reg(R11)]);
                }
                self.store(R11, target)
            }
            BinOp::Add | BinOp::Sub | BinOp::And | BinOp::Or | BinOp::Xor => {
                self.load(lhs, R11, Some(comment))?;
                let source = self.operand(rhs)?;
                let source = if source.is_wide_imm() {
                    self.emit(Movq, [source, Reg(R10)]);
                    Reg(R10)
                } else {
                    source
                };
                if let Some(accumulate) = Op::accumulating(op) {
                    self.emit(accumulate, [source, Reg(R11)]);
                }
                self.store(R11, target)
            }
        }
    }

    fn compile_param(&mut self, index: usize, value: &Value, comment: String) -> Result<(), LowerError> {
        let slot = self.frame.fresh_slot();
        self.load(value, R11, Some(comment))?;
        self.emit(Movq, [Reg(R11), slot.clone()]);
        self.arg_stack.push((index, slot));
        Ok(())
    }

    /// Pass the most recent `argc` arguments: the first six in registers,
    /// the rest pushed right to left with padding to keep the stack aligned.
    fn compile_call(
        &mut self,
        target: Option<&Name>,
        callee: &str,
        argc: usize,
    ) -> Result<(), LowerError> {
        let missing = || LowerError::MissingArgument {
            callee: callee.to_string(),
            argc,
        };
        let start = self.arg_stack.len().checked_sub(argc).ok_or_else(missing)?;
        let mut args = self.arg_stack.split_off(start);
        args.sort_by_key(|(index, _)| *index);
        if args.iter().enumerate().any(|(pos, (index, _))| *index != pos + 1) {
            return Err(missing());
        }

        let on_stack = argc.saturating_sub(calling_convention::reg_param_count());
        let padding = on_stack % 2 == 1;
        if padding {
            self.emit_cmt(Subq, [Imm(8), Reg(Rsp)], "align stack arguments");
        }
        for (index, slot) in args.iter().rev() {
            if calling_convention::param_register(index - 1).is_none() {
                self.emit_cmt(Pushq, [slot.clone()], format!("argument {}", index));
            }
        }
        for (index, slot) in &args {
            if let Some(reg) = calling_convention::param_register(index - 1) {
                self.emit_cmt(Movq, [slot.clone(), Reg(reg)], format!("argument {}", index));
            }
        }

        let comment = match target {
            Some(target) => format!("{} = call @{}", target, callee),
            None => format!("call @{}", callee),
        };
        self.emit_cmt(Callq, [Sym(callee.to_string())], comment);

        let cleanup = 8 * (on_stack as i64 + i64::from(padding));
        if cleanup > 0 {
            self.emit(Addq, [Imm(cleanup), Reg(Rsp)]);
        }
        if let Some(target) = target {
            self.store(RETURN_REGISTER, target)?;
        }
        Ok(())
    }

    /// The storage of a name: a frame slot for temporaries, a data cell for globals.
    fn location(&mut self, name: &Name) -> Result<Operand, LowerError> {
        match name {
            Name::Temp(temp) => Ok(self.frame.slot(temp)),
            Name::Global(global) if self.globals.contains(global) => Ok(Rip(global.clone())),
            Name::Global(global) => Err(LowerError::UndeclaredGlobal(global.clone())),
        }
    }

    fn operand(&mut self, value: &Value) -> Result<Operand, LowerError> {
        match value {
            Value::Const(literal) => Ok(Imm(*literal)),
            Value::Name(name) => self.location(name),
        }
    }

    /// An operand usable where the instruction takes no immediate, loading
    /// literals into `scratch`.
    fn register_or_memory(&mut self, value: &Value, scratch: Register) -> Result<Operand, LowerError> {
        let operand = self.operand(value)?;
        if operand.is_imm() {
            self.emit(Movq, [operand, Reg(scratch)]);
            Ok(Reg(scratch))
        } else {
            Ok(operand)
        }
    }

    fn load(&mut self, value: &Value, reg: Register, comment: Option<String>) -> Result<(), LowerError> {
        let operand = self.operand(value)?;
        match comment {
            Some(comment) => self.emit_cmt(Movq, [operand, Reg(reg)], comment),
            None => self.emit(Movq, [operand, Reg(reg)]),
        };
        Ok(())
    }

    fn store(&mut self, reg: Register, target: &Name) -> Result<(), LowerError> {
        let target = self.location(target)?;
        debug_assert!(target.is_mem());
        self.emit(Movq, [Reg(reg), target]);
        Ok(())
    }

    fn jump_label(&self, label: &Label) -> String {
        format!(".L{}.{}", self.proc.name, label)
    }

    fn emit<const N: usize>(&mut self, op: Op, operands: [Operand; N]) -> &mut Self {
        self.body.push(op, operands);
        self
    }

    fn emit_cmt<S: Into<String>, const N: usize>(
        &mut self,
        op: Op,
        operands: [Operand; N],
        comment: S,
    ) -> &mut Self {
        self.body.push_cmt(op, operands, comment);
        self
    }
}

/// The label of a procedure's epilogue.
pub fn exit_label(proc: &str) -> String {
    format!(".E_{}", proc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tac::text::tac;

    fn compile(params: &[&str], source: &str, globals: &[&str]) -> Procedure {
        let proc = tac::Procedure {
            name: "f".to_string(),
            params: params.iter().map(|p| Name::temp(*p)).collect(),
            body: tac(source),
        };
        let globals = globals.iter().map(ToString::to_string).collect();
        ProcedureCompiler::compile(&proc, &globals).unwrap()
    }

    fn lines(block: &Block) -> Vec<String> {
        block.instrs().map(|i| i.to_string().trim().to_string()).collect()
    }

    fn squash(lines: &[&str]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect()
    }

    fn squashed(block: &Block) -> Vec<String> {
        let lines = lines(block);
        squash(&lines.iter().map(String::as_str).collect::<Vec<_>>())
    }

    #[test]
    fn division_uses_rax_and_rdx() {
        let proc = compile(&["a", "b"], "%q = div %a, %b\n%r = mod %a, 7\nret %r", &[]);

        assert_eq!(
            squash(&[
                "movq -8(%rbp), %rax",
                "cqto",
                "idivq -16(%rbp)",
                "movq %rax, -24(%rbp)",
                "movq -8(%rbp), %rax",
                "movq $7, %r10",
                "cqto",
                "idivq %r10",
                "movq %rdx, -32(%rbp)",
                "movq -32(%rbp), %rax",
                "jmp .E_f",
            ]),
            squashed(&proc.body)
        );
    }

    #[test]
    fn comparisons_feed_conditional_jumps() {
        let proc = compile(&["a"], "cmpq %a, 10\njl L1\nret 0\nL1:\nret 1", &[]);

        let text = proc.body.to_string();
        assert!(text.contains("cmpq    %r11, %r10"));
        assert!(text.contains("jl      .Lf.L1"));
        assert!(text.contains("\n.Lf.L1:\n"));
    }

    #[test]
    fn shifts_take_their_count_in_cl() {
        let proc = compile(&["a", "n"], "%r = shl %a, %n\nret %r", &[]);

        assert!(squashed(&proc.body).contains(&"salq %cl, %r11".to_string()));
    }

    #[test]
    fn wide_literals_go_through_a_register() {
        let proc = compile(&[], "%x = const 4294967296\n%y = add %x, 8589934592\nret %y", &[]);

        let body = squashed(&proc.body);
        assert_eq!("movq $4294967296, %r11", body[0]);
        assert_eq!("movq %r11, -8(%rbp)", body[1]);
        assert!(body.contains(&"movq $8589934592, %r10".to_string()));
        assert!(body.contains(&"addq %r10, %r11".to_string()));
    }

    #[test]
    fn frame_covers_every_temporary() {
        let proc = compile(&["a"], "%b = add %a, 1\n%c = add %b, 1\nret %c", &[]);

        assert_eq!(
            squash(&["pushq %rbp", "movq %rsp, %rbp", "subq $32, %rsp", "movq %rdi, -8(%rbp)"]),
            squashed(&proc.prologue)
        );
        assert_eq!(
            squash(&["movq %rbp, %rsp", "popq %rbp", "retq"]),
            squashed(&proc.epilogue)
        );
    }

    #[test]
    fn stack_parameters_are_read_above_the_frame() {
        let params = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let proc = compile(&params, "%s = add %g, %h\nret %s", &[]);

        let body = squashed(&proc.body);
        assert_eq!("movq 16(%rbp), %r11", body[0]);
        assert_eq!("addq 24(%rbp), %r11", body[1]);
    }

    #[test]
    fn calls_pass_seven_arguments_with_padding() {
        let source = (1..=7)
            .rev()
            .map(|i| format!("param {}, {}", i, i * 10))
            .chain(["%r = call @g, 7".to_string(), "ret %r".to_string()])
            .collect::<Vec<_>>()
            .join("\n");
        let proc = compile(&[], &source, &[]);

        let body = squashed(&proc.body);
        let call = body.iter().position(|l| l == "callq g").unwrap();
        // Argument 7 was passed first, so it lives in the first slot.
        assert_eq!(
            squash(&[
                "subq $8, %rsp",
                "pushq -8(%rbp)",
                "movq -56(%rbp), %rdi",
                "movq -48(%rbp), %rsi",
                "movq -40(%rbp), %rdx",
                "movq -32(%rbp), %rcx",
                "movq -24(%rbp), %r8",
                "movq -16(%rbp), %r9",
                "callq g",
                "addq $16, %rsp",
                "movq %rax, -64(%rbp)",
            ]),
            body[call - 8..call + 3]
        );
    }

    #[test]
    fn globals_are_rip_relative_and_must_be_declared() {
        let proc = compile(&[], "@x = add @x, 1\nret", &["x"]);
        assert!(squashed(&proc.body).contains(&"movq %r11, x(%rip)".to_string()));

        let proc = tac::Procedure::new("f", tac("ret @y"));
        assert_eq!(
            Err(LowerError::UndeclaredGlobal("y".to_string())),
            ProcedureCompiler::compile(&proc, &HashSet::new()).map(|_| ())
        );
    }

    #[test]
    fn unmatched_call_is_rejected() {
        let proc = tac::Procedure::new("f", tac("param 2, 1\ncall @g, 1\nret"));

        assert_eq!(
            Err(LowerError::MissingArgument {
                callee: "g".to_string(),
                argc: 1,
            }),
            ProcedureCompiler::compile(&proc, &HashSet::new()).map(|_| ())
        );
    }
}
