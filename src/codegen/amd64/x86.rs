use std::fmt::{self, Display, Formatter};

use crate::tac::{BinOp, CmpOp, UnOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Rbp,
    Rsp,
    Rdi,
    Rsi,
    Rax,
    Rcx,
    Rdx,
    R8,
    R9,
    R10,
    R11,
    /// The low byte of `rcx`, which holds variable shift counts.
    Cl,
}
impl Display for Register {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Register::Rbp => "%rbp",
            Register::Rsp => "%rsp",
            Register::Rdi => "%rdi",
            Register::Rsi => "%rsi",
            Register::Rax => "%rax",
            Register::Rcx => "%rcx",
            Register::Rdx => "%rdx",
            Register::R8 => "%r8",
            Register::R9 => "%r9",
            Register::R10 => "%r10",
            Register::R11 => "%r11",
            Register::Cl => "%cl",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // Stack manipulation
    Pushq,
    Popq,
    Callq,
    Retq,
    // Copies
    Movq,
    Leaq,
    // Arithmetic
    Addq,
    Subq,
    Imulq,
    Idivq,
    Cqto,
    Negq,
    // Bitwise operations
    Andq,
    Orq,
    Xorq,
    Notq,
    Salq,
    Sarq,
    // Comparison
    Cmpq,
    // Jumps
    Jmp,
    Jz,
    Jnz,
    Jg,
    Jge,
    Jl,
    Jle,
}
impl Op {
    /// The conditional jump taken when the preceding `cmpq` satisfies `cmp`.
    pub fn jump_for(cmp: CmpOp) -> Op {
        match cmp {
            CmpOp::Less => Op::Jl,
            CmpOp::Greater => Op::Jg,
            CmpOp::LessEqual => Op::Jle,
            CmpOp::GreaterEqual => Op::Jge,
            CmpOp::Equal => Op::Jz,
            CmpOp::NotEqual => Op::Jnz,
        }
    }

    /// Two-operand instructions computing `dst = dst <op> src`, where they exist.
    pub fn accumulating(op: BinOp) -> Option<Op> {
        Some(match op {
            BinOp::Add => Op::Addq,
            BinOp::Sub => Op::Subq,
            BinOp::And => Op::Andq,
            BinOp::Or => Op::Orq,
            BinOp::Xor => Op::Xorq,
            BinOp::Shl => Op::Salq,
            BinOp::Shr => Op::Sarq,
            BinOp::Mul | BinOp::Div | BinOp::Mod => return None,
        })
    }

    pub fn unary(op: UnOp) -> Op {
        match op {
            UnOp::Neg => Op::Negq,
            UnOp::Not => Op::Notq,
        }
    }
}
impl Display for Op {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Op::Pushq => "pushq",
            Op::Popq => "popq",
            Op::Callq => "callq",
            Op::Retq => "retq",
            Op::Movq => "movq",
            Op::Leaq => "leaq",
            Op::Addq => "addq",
            Op::Subq => "subq",
            Op::Imulq => "imulq",
            Op::Idivq => "idivq",
            Op::Cqto => "cqto",
            Op::Negq => "negq",
            Op::Andq => "andq",
            Op::Orq => "orq",
            Op::Xorq => "xorq",
            Op::Notq => "notq",
            Op::Salq => "salq",
            Op::Sarq => "sarq",
            Op::Cmpq => "cmpq",
            Op::Jmp => "jmp",
            Op::Jz => "jz",
            Op::Jnz => "jnz",
            Op::Jg => "jg",
            Op::Jge => "jge",
            Op::Jl => "jl",
            Op::Jle => "jle",
        })
    }
}
