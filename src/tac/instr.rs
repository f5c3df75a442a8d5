//! Three-Address Code

use std::fmt::{self, Display, Formatter};

/// The reserved global cell holding the pending exception tag (0 = no exception).
pub const EXCEPTION_CELL: &str = "exception";

/// A complete TAC module, as produced by the front end.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Module {
    pub decls: Vec<Decl>,
}
impl Module {
    pub fn new(decls: Vec<Decl>) -> Self {
        Self { decls }
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalVar> {
        self.decls.iter().filter_map(|decl| match decl {
            Decl::Var(var) => Some(var),
            Decl::Proc(_) => None,
        })
    }

    pub fn procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.decls.iter().filter_map(|decl| match decl {
            Decl::Proc(proc) => Some(proc),
            Decl::Var(_) => None,
        })
    }

    pub fn procedures_mut(&mut self) -> impl Iterator<Item = &mut Procedure> {
        self.decls.iter_mut().filter_map(|decl| match decl {
            Decl::Proc(proc) => Some(proc),
            Decl::Var(_) => None,
        })
    }

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures().find(|proc| proc.name == name)
    }
}
impl Display for Module {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for decl in &self.decls {
            match decl {
                Decl::Var(var) => writeln!(f, "var @{} = {}", var.name, var.init)?,
                Decl::Proc(proc) => write!(f, "{}", proc)?,
            }
        }
        Ok(())
    }
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    Var(GlobalVar),
    Proc(Procedure),
}

/// A global variable with a constant initializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVar {
    pub name: String,
    pub init: i64,
}

/// A procedure and its flat instruction body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    pub name: String,
    /// Parameter temporaries, in argument order.
    pub params: Vec<Name>,
    pub body: Vec<Instr>,
}
impl Procedure {
    /// A procedure without parameters.
    pub fn new<S: Into<String>>(name: S, body: Vec<Instr>) -> Self {
        Self {
            name: name.into(),
            params: vec![],
            body,
        }
    }
}
impl Display for Procedure {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "proc @{}({})", self.name, params)?;
        for instr in &self.body {
            if let Instr::Label(_) = instr {
                writeln!(f, "    {}", instr)?;
            } else {
                writeln!(f, "        {}", instr)?;
            }
        }
        Ok(())
    }
}

/// A jump target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(String);
impl Label {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    /// The reserved label of every procedure's entry block.
    pub fn initial() -> Self {
        Self::new("initial")
    }

    pub fn is_initial(&self) -> bool {
        self.0 == "initial"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for Label {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A storage name: either a procedure-local temporary or a global variable.
/// Names are stored without their sigil.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Name {
    Temp(String),
    Global(String),
}
impl Name {
    pub fn temp<S: Into<String>>(name: S) -> Self {
        Self::Temp(name.into())
    }

    pub fn global<S: Into<String>>(name: S) -> Self {
        Self::Global(name.into())
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global(_))
    }
}
impl Display for Name {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Name::Temp(name) => write!(f, "%{}", name),
            Name::Global(name) => write!(f, "@{}", name),
        }
    }
}

/// A TAC value: an integer literal or a reference to a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Const(i64),
    Name(Name),
}
impl Value {
    pub fn temp<S: Into<String>>(name: S) -> Self {
        Self::Name(Name::temp(name))
    }

    pub fn global<S: Into<String>>(name: S) -> Self {
        Self::Name(Name::global(name))
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Value::Const(_) => None,
            Value::Name(n) => Some(n),
        }
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            Value::Const(c) => Some(*c),
            Value::Name(_) => None,
        }
    }
}
impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Value::Const(lit) => write!(f, "{}", lit),
            Value::Name(name) => write!(f, "{}", name),
        }
    }
}
impl From<Name> for Value {
    fn from(name: Name) -> Self {
        Value::Name(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}
impl BinOp {
    pub const ALL: [BinOp; 10] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Mod,
        BinOp::And,
        BinOp::Or,
        BinOp::Xor,
        BinOp::Shl,
        BinOp::Shr,
    ];

    pub fn opcode(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
        }
    }

    pub fn from_opcode(opcode: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.opcode() == opcode)
    }

    /// Integer division and remainder may trap on a zero divisor.
    pub fn may_trap(self) -> bool {
        matches!(self, BinOp::Div | BinOp::Mod)
    }

    /// Evaluate with 64-bit wrapping semantics. Returns `None` when the operation traps.
    pub fn evaluate(self, lhs: i64, rhs: i64) -> Option<i64> {
        Some(match self {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
            BinOp::Div => lhs.checked_div(rhs)?,
            BinOp::Mod => lhs.checked_rem(rhs)?,
            BinOp::And => lhs & rhs,
            BinOp::Or => lhs | rhs,
            BinOp::Xor => lhs ^ rhs,
            // The hardware masks the shift count to its low six bits.
            BinOp::Shl => lhs.wrapping_shl(rhs as u32 & 63),
            BinOp::Shr => lhs.wrapping_shr(rhs as u32 & 63),
        })
    }
}
impl Display for BinOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.opcode())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Not,
}
impl UnOp {
    pub fn opcode(self) -> &'static str {
        match self {
            UnOp::Neg => "neg",
            UnOp::Not => "not",
        }
    }

    pub fn from_opcode(opcode: &str) -> Option<Self> {
        match opcode {
            "neg" => Some(UnOp::Neg),
            "not" => Some(UnOp::Not),
            _ => None,
        }
    }

    pub fn evaluate(self, value: i64) -> i64 {
        match self {
            UnOp::Neg => value.wrapping_neg(),
            UnOp::Not => !value,
        }
    }
}
impl Display for UnOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.opcode())
    }
}

/// The comparator of a conditional jump. A jump `jcc` following `cmpq a, b`
/// is taken when `a <cmp> b` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
}
impl CmpOp {
    pub const ALL: [CmpOp; 6] = [
        CmpOp::Less,
        CmpOp::Greater,
        CmpOp::LessEqual,
        CmpOp::GreaterEqual,
        CmpOp::Equal,
        CmpOp::NotEqual,
    ];

    pub fn opcode(self) -> &'static str {
        match self {
            CmpOp::Less => "jl",
            CmpOp::Greater => "jg",
            CmpOp::LessEqual => "jle",
            CmpOp::GreaterEqual => "jge",
            CmpOp::Equal => "jz",
            CmpOp::NotEqual => "jnz",
        }
    }

    pub fn from_opcode(opcode: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.opcode() == opcode)
    }

    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Less => lhs < rhs,
            CmpOp::Greater => lhs > rhs,
            CmpOp::LessEqual => lhs <= rhs,
            CmpOp::GreaterEqual => lhs >= rhs,
            CmpOp::Equal => lhs == rhs,
            CmpOp::NotEqual => lhs != rhs,
        }
    }

    /// The comparator that holds for `(b, a)` exactly when `self` holds for `(a, b)`.
    pub fn mirrored(self) -> Self {
        match self {
            CmpOp::Less => CmpOp::Greater,
            CmpOp::Greater => CmpOp::Less,
            CmpOp::LessEqual => CmpOp::GreaterEqual,
            CmpOp::GreaterEqual => CmpOp::LessEqual,
            CmpOp::Equal => CmpOp::Equal,
            CmpOp::NotEqual => CmpOp::NotEqual,
        }
    }

    /// Given that `self` held for some operand pair, decide whether `other`
    /// holds for the same pair. `None` when it cannot be decided.
    pub fn implies(self, other: CmpOp) -> Option<bool> {
        use CmpOp::*;
        let (implied_true, implied_false): (&[CmpOp], &[CmpOp]) = match self {
            Less => (&[Less, NotEqual, LessEqual], &[Greater, Equal, GreaterEqual]),
            Greater => (&[Greater, NotEqual, GreaterEqual], &[Less, Equal, LessEqual]),
            LessEqual => (&[LessEqual], &[Greater]),
            GreaterEqual => (&[GreaterEqual], &[Less]),
            Equal => (&[Equal, GreaterEqual, LessEqual], &[NotEqual, Less, Greater]),
            NotEqual => (&[NotEqual], &[Equal]),
        };
        if implied_true.contains(&other) {
            Some(true)
        } else if implied_false.contains(&other) {
            Some(false)
        } else {
            None
        }
    }
}
impl Display for CmpOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Less => "<",
            CmpOp::Greater => ">",
            CmpOp::LessEqual => "<=",
            CmpOp::GreaterEqual => ">=",
            CmpOp::Equal => "==",
            CmpOp::NotEqual => "!=",
        })
    }
}

/// A single TAC instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// Load an integer literal.
    Const(Name, i64),
    /// Copy a value to a name.
    Copy(Name, Value),
    /// Perform a binary operation.
    Bin(Name, BinOp, Value, Value),
    /// Perform a unary operation.
    Un(Name, UnOp, Value),
    /// Compare two values, setting the flags read by the next conditional jump.
    Cmp(Value, Value),
    /// Jump to a label.
    Jmp(Label),
    /// Jump to a label if the most recent comparison satisfies the comparator.
    CondJmp(CmpOp, Label),
    /// A label which can be jumped to.
    Label(Label),
    /// Return from the procedure, optionally with a value.
    Ret(Option<Value>),
    /// Call a procedure with `argc` arguments previously passed by `param`.
    Call(Option<Name>, String, usize),
    /// Pass the argument with the given 1-based index to the next call.
    Param(usize, Value),
    Nop,
}
impl Instr {
    pub fn opcode(&self) -> &'static str {
        match self {
            Self::Const(..) => "const",
            Self::Copy(..) => "copy",
            Self::Bin(_, op, _, _) => op.opcode(),
            Self::Un(_, op, _) => op.opcode(),
            Self::Cmp(..) => "cmpq",
            Self::Jmp(_) => "jmp",
            Self::CondJmp(op, _) => op.opcode(),
            Self::Label(_) => "label",
            Self::Ret(_) => "ret",
            Self::Call(..) => "call",
            Self::Param(..) => "param",
            Self::Nop => "nop",
        }
    }

    /// The name written by this instruction, if any.
    pub fn write(&self) -> Option<&Name> {
        match self {
            Self::Const(t, _) => Some(t),
            Self::Copy(t, _) => Some(t),
            Self::Bin(t, _, _, _) => Some(t),
            Self::Un(t, _, _) => Some(t),
            Self::Call(t, _, _) => t.as_ref(),
            Self::Cmp(..)
            | Self::Jmp(_)
            | Self::CondJmp(..)
            | Self::Label(_)
            | Self::Ret(_)
            | Self::Param(..)
            | Self::Nop => None,
        }
    }

    /// The values read by this instruction.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Self::Copy(_, v) | Self::Un(_, _, v) | Self::Param(_, v) => vec![v],
            Self::Bin(_, _, lhs, rhs) | Self::Cmp(lhs, rhs) => vec![lhs, rhs],
            Self::Ret(v) => v.iter().collect(),
            Self::Const(..)
            | Self::Jmp(_)
            | Self::CondJmp(..)
            | Self::Label(_)
            | Self::Call(..)
            | Self::Nop => vec![],
        }
    }

    pub fn values_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Self::Copy(_, v) | Self::Un(_, _, v) | Self::Param(_, v) => vec![v],
            Self::Bin(_, _, lhs, rhs) | Self::Cmp(lhs, rhs) => vec![lhs, rhs],
            Self::Ret(v) => v.iter_mut().collect(),
            Self::Const(..)
            | Self::Jmp(_)
            | Self::CondJmp(..)
            | Self::Label(_)
            | Self::Call(..)
            | Self::Nop => vec![],
        }
    }

    /// The names read by this instruction.
    pub fn reads(&self) -> Vec<&Name> {
        self.values().into_iter().filter_map(Value::as_name).collect()
    }

    pub fn reads_from_name(&self, name: &Name) -> bool {
        self.reads().into_iter().any(|n| n == name)
    }

    /// Whether executing this instruction may change the value of `name`.
    /// A call may write any global.
    pub fn redefines(&self, name: &Name) -> bool {
        self.write() == Some(name) || (matches!(self, Self::Call(..)) && name.is_global())
    }

    /// Instructions that must be kept even when their result is never read.
    pub fn has_side_effect(&self) -> bool {
        match self {
            Self::Bin(_, op, _, _) if op.may_trap() => true,
            Self::Call(..) | Self::Param(..) => true,
            // Globals remain observable after the procedure returns.
            other => other.write().map_or(false, Name::is_global),
        }
    }

    pub fn is_jump(&self) -> bool {
        matches!(self, Self::Jmp(_) | Self::CondJmp(..))
    }

    /// Jumps and returns end a basic block.
    pub fn is_control_transfer(&self) -> bool {
        matches!(self, Self::Jmp(_) | Self::CondJmp(..) | Self::Ret(_))
    }

    pub fn jump_target(&self) -> Option<&Label> {
        match self {
            Self::Jmp(lbl) | Self::CondJmp(_, lbl) => Some(lbl),
            _ => None,
        }
    }

    pub fn jump_target_mut(&mut self) -> Option<&mut Label> {
        match self {
            Self::Jmp(lbl) | Self::CondJmp(_, lbl) => Some(lbl),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&Label> {
        match self {
            Self::Label(lbl) => Some(lbl),
            _ => None,
        }
    }

    pub fn as_copy(&self) -> Option<(&Name, &Value)> {
        match self {
            Self::Copy(name, value) => Some((name, value)),
            _ => None,
        }
    }

    /// Replace every read of a name for which `f` returns a replacement.
    pub fn replace_reads<F>(&mut self, mut f: F)
    where
        F: FnMut(&Name) -> Option<Value>,
    {
        for value in self.values_mut() {
            if let Value::Name(name) = value {
                if let Some(replacement) = f(name) {
                    *value = replacement;
                }
            }
        }
    }
}
impl Display for Instr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Const(target, value) => write!(f, "{} = const {}", target, value),
            Self::Copy(target, value) => write!(f, "{} = copy {}", target, value),
            Self::Bin(target, op, lhs, rhs) => write!(f, "{} = {} {}, {}", target, op, lhs, rhs),
            Self::Un(target, op, value) => write!(f, "{} = {} {}", target, op, value),
            Self::Cmp(lhs, rhs) => write!(f, "cmpq {}, {}", lhs, rhs),
            Self::Jmp(lbl) => write!(f, "jmp {}", lbl),
            Self::CondJmp(op, lbl) => write!(f, "{} {}", op.opcode(), lbl),
            Self::Label(lbl) => write!(f, "{}:", lbl),
            Self::Ret(None) => f.write_str("ret"),
            Self::Ret(Some(value)) => write!(f, "ret {}", value),
            Self::Call(Some(target), name, argc) => {
                write!(f, "{} = call @{}, {}", target, name, argc)
            }
            Self::Call(None, name, argc) => write!(f, "call @{}, {}", name, argc),
            Self::Param(index, value) => write!(f, "param {}, {}", index, value),
            Self::Nop => f.write_str("nop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_display_in_tac_notation() {
        let add = Instr::Bin(
            Name::temp("2"),
            BinOp::Add,
            Value::temp("0"),
            Value::global("x"),
        );
        assert_eq!("%2 = add %0, @x", add.to_string());
        assert_eq!(
            "%3 = call @f, 2",
            Instr::Call(Some(Name::temp("3")), "f".to_string(), 2).to_string()
        );
        assert_eq!("jle L4", Instr::CondJmp(CmpOp::LessEqual, Label::new("L4")).to_string());
    }

    #[test]
    fn comparator_table_is_consistent_with_evaluation() {
        for first in CmpOp::ALL {
            for second in CmpOp::ALL {
                let Some(implied) = first.implies(second) else {
                    continue;
                };
                for (a, b) in [(1, 2), (2, 2), (3, 2)] {
                    if first.holds(a, b) {
                        assert_eq!(implied, second.holds(a, b), "{first:?} -> {second:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn mirrored_comparator_swaps_operands() {
        for op in CmpOp::ALL {
            for (a, b) in [(1, 2), (2, 2), (3, 2)] {
                assert_eq!(op.holds(a, b), op.mirrored().holds(b, a));
            }
        }
    }

    #[test]
    fn trapping_and_global_writes_have_side_effects() {
        let div = Instr::Bin(Name::temp("d"), BinOp::Div, Value::temp("a"), Value::temp("b"));
        let add = Instr::Bin(Name::temp("d"), BinOp::Add, Value::temp("a"), Value::temp("b"));
        let store = Instr::Copy(Name::global(EXCEPTION_CELL), Value::temp("t"));

        assert!(div.has_side_effect());
        assert!(!add.has_side_effect());
        assert!(store.has_side_effect());
    }

    #[test]
    fn calls_clobber_globals_only() {
        let call = Instr::Call(None, "f".to_string(), 0);

        assert!(call.redefines(&Name::global(EXCEPTION_CELL)));
        assert!(!call.redefines(&Name::temp("0")));
    }
}
