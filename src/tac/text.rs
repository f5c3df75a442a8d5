//! Reading instructions written in the notation used by their `Display`
//! implementation, for compact test fixtures.

use super::{
    loader::{decode_instr, RawArg, RawInstr},
    Instr,
};

/// Parse one instruction per line, e.g. `%1 = add %0, 2`, `cmpq %1, 0`, `L1:`.
pub fn tac(source: &str) -> Vec<Instr> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| decode_instr(raw(line)).unwrap_or_else(|e| panic!("{}: {}", line, e)))
        .collect()
}

fn raw(line: &str) -> RawInstr {
    if let Some(label) = line.strip_suffix(':') {
        return RawInstr {
            opcode: "label".to_string(),
            args: vec![arg(label)],
            result: None,
        };
    }

    let (result, rest) = match line.split_once(" = ") {
        Some((result, rest)) => (Some(result.trim().to_string()), rest),
        None => (None, line),
    };
    let (opcode, args) = rest.split_once(' ').unwrap_or((rest, ""));
    RawInstr {
        opcode: opcode.to_string(),
        args: args
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(arg)
            .collect(),
        result,
    }
}

fn arg(text: &str) -> RawArg {
    match text.parse() {
        Ok(int) => RawArg::Int(int),
        Err(_) => RawArg::Str(text.to_string()),
    }
}
