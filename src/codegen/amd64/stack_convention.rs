//! Conventions for stack usage: frame layout, prologue and epilogue.
use std::collections::HashMap;

use super::assembly::*;
use super::calling_convention::STACK_ALIGNMENT;
use super::x86::*;

use Op::*;
use Operand::*;
use Register::*;

/// Assigns every temporary of a procedure an 8-byte cell in its frame.
#[derive(Debug, Default)]
pub struct StackFrame {
    slots: HashMap<String, Operand>,
    locals: i64,
}
impl StackFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cell of a temporary, allocated below the base pointer on first use.
    pub fn slot(&mut self, temp: &str) -> Operand {
        if let Some(slot) = self.slots.get(temp) {
            return slot.clone();
        }
        let slot = self.fresh_slot();
        self.slots.insert(temp.to_string(), slot.clone());
        slot
    }

    /// An anonymous cell, used to hold outgoing arguments until their call.
    pub fn fresh_slot(&mut self) -> Operand {
        self.locals += 1;
        Mem(-8 * self.locals, Rbp)
    }

    /// Bind a temporary to an argument the caller passed on the stack.
    pub fn bind_incoming(&mut self, temp: &str, offset: i64) {
        self.slots.insert(temp.to_string(), Mem(offset, Rbp));
    }

    /// Bytes to reserve below the base pointer, keeping the stack aligned.
    pub fn size(&self) -> i64 {
        let bytes = 8 * self.locals;
        (bytes + STACK_ALIGNMENT - 1) / STACK_ALIGNMENT * STACK_ALIGNMENT
    }
}

pub fn prologue(frame_size: i64) -> Block {
    let mut block = Block::new();
    block
        .push_cmt(Pushq, [Reg(Rbp)], "store base pointer")
        .push_cmt(Movq, [Reg(Rsp), Reg(Rbp)], "move base pointer down");
    if frame_size > 0 {
        block.push_cmt(Subq, [Imm(frame_size), Reg(Rsp)], "reserve frame");
    }
    block
}

/// The shared exit of a procedure, reached by a jump from every return.
pub fn epilogue(exit_label: String) -> Block {
    let mut block = Block::new();
    block
        .label(exit_label)
        .push_cmt(Movq, [Reg(Rbp), Reg(Rsp)], "move stack pointer back up")
        .push_cmt(Popq, [Reg(Rbp)], "restore previous base pointer")
        .push_cmt(Retq, [], "return to caller");
    block
}
