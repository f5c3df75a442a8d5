//! General assembly definitions, written in AT&T syntax for the GNU assembler.

use std::fmt::{self, Display, Formatter};

use super::x86::{Op, Register};

pub type Str = &'static str;

/// A complete assembly file.
pub struct Assembly {
    pub rodata: Data,
    pub data: Data,
    pub text: Text,
}
impl Assembly {
    pub fn new() -> Self {
        Self {
            rodata: Data::new(".section .rodata"),
            data: Data::new(".data"),
            text: Text::new(),
        }
    }
}
impl Display for Assembly {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.rodata)?;
        write!(f, "{}", self.data)?;
        write!(f, "{}", self.text)
    }
}

/// A section of an assembly file, such as `.text` or `.data`.
pub trait Section {
    fn name(&self) -> Str;
    fn is_empty(&self) -> bool;
}

/// A section containing only directives.
pub struct Data {
    name: Str,
    lines: Vec<Line<Directive>>,
}
impl Data {
    pub fn new(name: Str) -> Self {
        Self {
            name,
            lines: vec![],
        }
    }

    /// Declare an exported, 8-byte integer cell.
    pub fn quad<S: Into<String>>(&mut self, name: S, value: i64) -> &mut Self {
        let name = name.into();
        self.lines.push(Line::new(Directive::Globl(name.clone())));
        self.lines.push(Line::new(Directive::Label(name)));
        self.lines.push(Line::new(Directive::Quad(value)));
        self
    }

    /// Declare a local, NUL-terminated string.
    pub fn string<S: Into<String>>(&mut self, name: S, escaped: S) -> &mut Self {
        self.lines.push(Line::new(Directive::Label(name.into())));
        self.lines.push(Line::new(Directive::String(escaped.into())));
        self
    }
}
impl Section for Data {
    fn name(&self) -> Str {
        self.name
    }

    fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
impl Display for Data {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        writeln!(f, "    {}", self.name())?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// A `.text` section, containing any number of procedures.
pub struct Text {
    pub procedures: Vec<Procedure>,
}
impl Text {
    pub fn new() -> Self {
        Self { procedures: vec![] }
    }
}
impl Section for Text {
    fn name(&self) -> Str {
        ".text"
    }

    fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}
impl Display for Text {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "    {}", self.name())?;
        for proc in &self.procedures {
            writeln!(f, "{}", proc)?;
        }
        Ok(())
    }
}

/// An exported assembly procedure, marked by a label and surrounded by a prologue and epilogue.
pub struct Procedure {
    pub name: String,
    pub prologue: Block,
    pub body: Block,
    pub epilogue: Block,
}
impl Procedure {
    pub fn new<S: Into<String>>(name: S, prologue: Block, epilogue: Block) -> Self {
        Self {
            name: name.into(),
            prologue,
            body: Block::new(),
            epilogue,
        }
    }
}
impl Display for Procedure {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "{}", Line::new(Directive::Globl(self.name.clone())))?;
        writeln!(f, "{}:", self.name)?;
        write!(f, "{}", self.prologue)?;
        write!(f, "{}", self.body)?;
        write!(f, "{}", self.epilogue)
    }
}

/// A directive, used to lay out data and provide hints to the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Globl(String),
    Label(String),
    Quad(i64),
    String(String),
}
impl Display for Directive {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Directive::Globl(name) => write!(f, "    {:7} {}", ".globl", name),
            Directive::Label(name) => write!(f, "{}:", name),
            Directive::Quad(value) => write!(f, "    {:7} {}", ".quad", value),
            Directive::String(escaped) => write!(f, "    {:7} \"{}\"", ".string", escaped),
        }
    }
}

/// A single statement in a block of code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Instr(Instr),
    Label(String),
}
impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Stmt::Instr(instr) => write!(f, "{}", instr),
            Stmt::Label(label) => write!(f, "{}:", label),
        }
    }
}

/// A block of assembly code.
#[derive(Debug, Default)]
pub struct Block {
    lines: Vec<Line<Stmt>>,
}
impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<const N: usize>(&mut self, op: Op, operands: [Operand; N]) -> &mut Self {
        self.lines
            .push(Line::new(Stmt::Instr(Instr::new(op, operands.into()))));
        self
    }

    pub fn push_cmt<S: Into<String>, const N: usize>(
        &mut self,
        op: Op,
        operands: [Operand; N],
        comment: S,
    ) -> &mut Self {
        self.lines.push(Line::new_cmt(
            Stmt::Instr(Instr::new(op, operands.into())),
            comment.into(),
        ));
        self
    }

    pub fn label<S: Into<String>>(&mut self, label: S) -> &mut Self {
        self.lines.push(Line::new(Stmt::Label(label.into())));
        self
    }

    pub fn comment<S: Into<String>>(&mut self, comment: S) -> &mut Self {
        self.lines.push(Line::comment_only(comment.into()));
        self
    }

    pub fn append(&mut self, other: Block) -> &mut Self {
        self.lines.extend(other.lines);
        self
    }

    /// The instructions of the block, without labels or comments.
    #[cfg(test)]
    pub fn instrs(&self) -> impl Iterator<Item = &Instr> {
        self.lines.iter().filter_map(|line| match &line.line {
            Some(Stmt::Instr(instr)) => Some(instr),
            _ => None,
        })
    }
}
impl Display for Block {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// A line of assembly, consisting of an optional statement and optional comment.
#[derive(Debug)]
pub struct Line<T> {
    line: Option<T>,
    comment: Option<String>,
}
impl<T> Line<T> {
    /// Construct a new line without comment.
    pub fn new(content: T) -> Self {
        Self {
            line: Some(content),
            comment: None,
        }
    }

    /// Construct a new line with a comment.
    pub fn new_cmt(content: T, comment: String) -> Self {
        Self {
            line: Some(content),
            comment: Some(comment),
        }
    }

    pub fn comment_only(comment: String) -> Self {
        Self {
            line: None,
            comment: Some(comment),
        }
    }
}
impl<T: Display> Display for Line<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match (&self.line, self.comment.as_ref()) {
            (None, None) => Ok(()),
            (None, Some(cmt)) => write!(f, "    # {}", cmt),
            (Some(content), None) => write!(f, "{}", content),
            (Some(content), Some(cmt)) => write!(f, "{:40}# {}", content.to_string(), cmt),
        }
    }
}

/// A single instruction, consisting of an operator and zero or more operands
/// in AT&T order (sources first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instr {
    pub operator: Op,
    pub operands: Vec<Operand>,
}
impl Instr {
    pub fn new(operator: Op, operands: Vec<Operand>) -> Instr {
        Self { operator, operands }
    }
}
impl Display for Instr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.operands.is_empty() {
            return write!(f, "    {}", self.operator);
        }
        let operands = self
            .operands
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "    {:7} {}", self.operator.to_string(), operands)
    }
}

/// An operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A register
    Reg(Register),
    /// An immediate value
    Imm(i64),
    /// A memory cell at a fixed offset from a base register
    Mem(i64, Register),
    /// A data symbol, addressed relative to the instruction pointer
    Rip(String),
    /// A code label or procedure name, as the target of a jump or call
    Sym(String),
}
impl Operand {
    pub fn is_imm(&self) -> bool {
        matches!(self, Operand::Imm(_))
    }

    pub fn is_mem(&self) -> bool {
        matches!(self, Operand::Mem(..) | Operand::Rip(_))
    }

    /// Most instructions only accept sign-extended 32-bit immediates.
    pub fn is_wide_imm(&self) -> bool {
        matches!(self, Operand::Imm(value) if i32::try_from(*value).is_err())
    }
}
impl Display for Operand {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{}", reg),
            Operand::Imm(value) => write!(f, "${}", value),
            Operand::Mem(offset, base) => write!(f, "{}({})", offset, base),
            Operand::Rip(symbol) => write!(f, "{}(%rip)", symbol),
            Operand::Sym(symbol) => f.write_str(symbol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use Operand::*;
    use Register::*;

    #[test]
    fn instr_serializes_in_att_order() {
        let instr = Instr::new(Op::Movq, vec![Mem(-16, Rbp), Reg(Rax)]);

        assert_eq!("    movq    -16(%rbp), %rax", instr.to_string());
        assert_eq!("    cqto", Instr::new(Op::Cqto, vec![]).to_string());
        assert_eq!(
            "    leaq    fmt(%rip), %rdi",
            Instr::new(Op::Leaq, vec![Rip("fmt".to_string()), Reg(Rdi)]).to_string()
        );
    }

    #[test]
    fn data_section_exports_cells() {
        let mut data = Data::new(".data");
        data.quad("counter", -3);

        assert_eq!(
            "    .data\n    .globl  counter\ncounter:\n    .quad   -3\n",
            data.to_string()
        );
    }

    #[test]
    fn comments_are_aligned() {
        let mut block = Block::new();
        block.push_cmt(Op::Pushq, [Reg(Rbp)], "save");

        assert_eq!(format!("{:40}# save\n", "    pushq   %rbp"), block.to_string());
    }
}
