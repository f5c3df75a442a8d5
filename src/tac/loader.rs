//! Decoding and encoding of the serialized TAC document.
//!
//! The document is a JSON array of declarations:
//! ```text
//! [ {"var": "@x", "init": 42},
//!   {"proc": "@main", "args": ["%a"],
//!    "body": [{"opcode": "const", "args": [1], "result": "%0"}, ...]} ]
//! ```
//! Every instruction is validated against the arity and operand kinds of its
//! opcode while it is decoded into the typed [`Instr`] model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::instr::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TacError {
    #[error("malformed TAC document: {0}")]
    Document(String),
    #[error("unknown opcode '{0}'")]
    UnknownOpcode(String),
    #[error("'{opcode}' expects {expected} argument(s), found {found}")]
    Arity {
        opcode: String,
        expected: &'static str,
        found: usize,
    },
    #[error("argument {index} of '{opcode}' must be {expected}, found {found}")]
    OperandType {
        opcode: String,
        index: usize,
        expected: &'static str,
        found: String,
    },
    #[error("'{0}' requires a result")]
    MissingResult(String),
    #[error("'{0}' does not produce a result")]
    UnexpectedResult(String),
    #[error("invalid name '{0}': expected a '%' temporary or an '@' global")]
    InvalidName(String),
    #[error("invalid procedure or global name '{0}': expected an '@' name")]
    InvalidGlobal(String),
    #[error("parameter '{0}' must be a temporary")]
    InvalidParameter(String),
    #[error("@{procedure}, instruction #{index} ({opcode}): {reason}")]
    Instruction {
        procedure: String,
        index: usize,
        opcode: String,
        reason: Box<TacError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDecl {
    Var {
        var: String,
        init: i64,
    },
    Proc {
        proc: String,
        #[serde(default)]
        args: Vec<String>,
        body: Vec<RawInstr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInstr {
    pub opcode: String,
    #[serde(default)]
    pub args: Vec<RawArg>,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawArg {
    Int(i64),
    Str(String),
}
impl RawArg {
    fn describe(&self) -> String {
        match self {
            RawArg::Int(i) => format!("integer {}", i),
            RawArg::Str(s) => format!("'{}'", s),
        }
    }
}

/// Parse a module from its JSON text.
pub fn load_module(source: &str) -> Result<Module, TacError> {
    let raw: Vec<RawDecl> =
        serde_json::from_str(source).map_err(|e| TacError::Document(e.to_string()))?;
    decode_module(raw)
}

/// Serialize a module to JSON text.
pub fn store_module(module: &Module) -> Result<String, TacError> {
    serde_json::to_string_pretty(&encode_module(module))
        .map_err(|e| TacError::Document(e.to_string()))
}

pub fn decode_module(raw: Vec<RawDecl>) -> Result<Module, TacError> {
    raw.into_iter()
        .map(decode_decl)
        .collect::<Result<Vec<_>, _>>()
        .map(Module::new)
}

pub fn encode_module(module: &Module) -> Vec<RawDecl> {
    module.decls.iter().map(encode_decl).collect()
}

fn decode_decl(raw: RawDecl) -> Result<Decl, TacError> {
    match raw {
        RawDecl::Var { var, init } => Ok(Decl::Var(GlobalVar {
            name: global_name(&var)?,
            init,
        })),
        RawDecl::Proc { proc, args, body } => {
            let params = args
                .iter()
                .map(|arg| match parse_name(arg)? {
                    temp @ Name::Temp(_) => Ok(temp),
                    Name::Global(_) => Err(TacError::InvalidParameter(arg.clone())),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let body = body
                .into_iter()
                .enumerate()
                .map(|(index, instr)| {
                    let opcode = instr.opcode.clone();
                    decode_instr(instr).map_err(|reason| TacError::Instruction {
                        procedure: proc.trim_start_matches('@').to_string(),
                        index,
                        opcode,
                        reason: Box::new(reason),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Decl::Proc(Procedure {
                name: global_name(&proc)?,
                params,
                body,
            }))
        }
    }
}

fn encode_decl(decl: &Decl) -> RawDecl {
    match decl {
        Decl::Var(var) => RawDecl::Var {
            var: format!("@{}", var.name),
            init: var.init,
        },
        Decl::Proc(proc) => RawDecl::Proc {
            proc: format!("@{}", proc.name),
            args: proc.params.iter().map(ToString::to_string).collect(),
            body: proc.body.iter().map(encode_instr).collect(),
        },
    }
}

/// Decode a single instruction, checking arity and operand kinds.
pub fn decode_instr(raw: RawInstr) -> Result<Instr, TacError> {
    let RawInstr {
        opcode,
        args,
        result,
    } = raw;
    let op = opcode.as_str();

    let instr = if let Some(bin) = BinOp::from_opcode(op) {
        expect_arity(op, &args, 2)?;
        Instr::Bin(
            required_result(op, &result)?,
            bin,
            value_arg(op, &args, 0)?,
            value_arg(op, &args, 1)?,
        )
    } else if let Some(un) = UnOp::from_opcode(op) {
        expect_arity(op, &args, 1)?;
        Instr::Un(required_result(op, &result)?, un, value_arg(op, &args, 0)?)
    } else if let Some(cmp) = CmpOp::from_opcode(op) {
        expect_arity(op, &args, 1)?;
        no_result(op, &result)?;
        Instr::CondJmp(cmp, label_arg(&args[0]))
    } else {
        match op {
            "const" => {
                expect_arity(op, &args, 1)?;
                Instr::Const(required_result(op, &result)?, int_arg(op, &args, 0)?)
            }
            "copy" => {
                expect_arity(op, &args, 1)?;
                Instr::Copy(required_result(op, &result)?, value_arg(op, &args, 0)?)
            }
            "cmpq" => {
                expect_arity(op, &args, 2)?;
                no_result(op, &result)?;
                Instr::Cmp(value_arg(op, &args, 0)?, value_arg(op, &args, 1)?)
            }
            "jmp" => {
                expect_arity(op, &args, 1)?;
                no_result(op, &result)?;
                Instr::Jmp(label_arg(&args[0]))
            }
            "label" => {
                expect_arity(op, &args, 1)?;
                no_result(op, &result)?;
                Instr::Label(label_arg(&args[0]))
            }
            "ret" => {
                no_result(op, &result)?;
                match args.len() {
                    0 => Instr::Ret(None),
                    1 => Instr::Ret(Some(value_arg(op, &args, 0)?)),
                    found => {
                        return Err(TacError::Arity {
                            opcode: op.to_string(),
                            expected: "0 or 1",
                            found,
                        })
                    }
                }
            }
            "call" => {
                expect_arity(op, &args, 2)?;
                let callee = match &args[0] {
                    RawArg::Str(name) => global_name(name)?,
                    other => return Err(operand_type(op, 0, "a procedure name", other)),
                };
                let argc = count_arg(op, &args, 1)?;
                let target = result.as_deref().map(parse_name).transpose()?;
                Instr::Call(target, callee, argc)
            }
            "param" => {
                expect_arity(op, &args, 2)?;
                no_result(op, &result)?;
                let index = count_arg(op, &args, 0)?;
                if index == 0 {
                    return Err(operand_type(op, 0, "a 1-based index", &args[0]));
                }
                Instr::Param(index, value_arg(op, &args, 1)?)
            }
            "nop" => {
                expect_arity(op, &args, 0)?;
                no_result(op, &result)?;
                Instr::Nop
            }
            _ => return Err(TacError::UnknownOpcode(op.to_string())),
        }
    };

    Ok(instr)
}

pub fn encode_instr(instr: &Instr) -> RawInstr {
    let value = |v: &Value| match v {
        Value::Const(c) => RawArg::Int(*c),
        Value::Name(name) => RawArg::Str(name.to_string()),
    };
    let args = match instr {
        Instr::Const(_, c) => vec![RawArg::Int(*c)],
        Instr::Copy(_, v) | Instr::Un(_, _, v) => vec![value(v)],
        Instr::Bin(_, _, lhs, rhs) | Instr::Cmp(lhs, rhs) => vec![value(lhs), value(rhs)],
        Instr::Jmp(lbl) | Instr::CondJmp(_, lbl) | Instr::Label(lbl) => vec![encode_label(lbl)],
        Instr::Ret(v) => v.iter().map(value).collect(),
        Instr::Call(_, callee, argc) => vec![
            RawArg::Str(format!("@{}", callee)),
            RawArg::Int(*argc as i64),
        ],
        Instr::Param(index, v) => vec![RawArg::Int(*index as i64), value(v)],
        Instr::Nop => vec![],
    };

    RawInstr {
        opcode: instr.opcode().to_string(),
        args,
        result: instr.write().map(ToString::to_string),
    }
}

/// Labels produced by the front end are frequently plain integers; they are
/// kept as strings internally and written back as integers.
fn encode_label(label: &Label) -> RawArg {
    match label.as_str().parse::<i64>() {
        Ok(i) if i.to_string() == label.as_str() => RawArg::Int(i),
        _ => RawArg::Str(label.to_string()),
    }
}

fn label_arg(arg: &RawArg) -> Label {
    match arg {
        RawArg::Int(i) => Label::new(i.to_string()),
        RawArg::Str(s) => Label::new(s.clone()),
    }
}

pub fn parse_name(name: &str) -> Result<Name, TacError> {
    match (name.strip_prefix('%'), name.strip_prefix('@')) {
        (Some(temp), _) if !temp.is_empty() => Ok(Name::temp(temp)),
        (_, Some(global)) if !global.is_empty() => Ok(Name::global(global)),
        _ => Err(TacError::InvalidName(name.to_string())),
    }
}

fn global_name(name: &str) -> Result<String, TacError> {
    match name.strip_prefix('@') {
        Some(rest) if !rest.is_empty() => Ok(rest.to_string()),
        _ => Err(TacError::InvalidGlobal(name.to_string())),
    }
}

fn expect_arity(opcode: &str, args: &[RawArg], expected: usize) -> Result<(), TacError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(TacError::Arity {
            opcode: opcode.to_string(),
            expected: ["0", "1", "2"][expected],
            found: args.len(),
        })
    }
}

fn required_result(opcode: &str, result: &Option<String>) -> Result<Name, TacError> {
    match result {
        Some(name) => parse_name(name),
        None => Err(TacError::MissingResult(opcode.to_string())),
    }
}

fn no_result(opcode: &str, result: &Option<String>) -> Result<(), TacError> {
    match result {
        None => Ok(()),
        Some(_) => Err(TacError::UnexpectedResult(opcode.to_string())),
    }
}

fn value_arg(opcode: &str, args: &[RawArg], index: usize) -> Result<Value, TacError> {
    match &args[index] {
        RawArg::Int(i) => Ok(Value::Const(*i)),
        RawArg::Str(s) => parse_name(s)
            .map(Value::Name)
            .map_err(|_| operand_type(opcode, index, "a name or an integer", &args[index])),
    }
}

fn int_arg(opcode: &str, args: &[RawArg], index: usize) -> Result<i64, TacError> {
    match &args[index] {
        RawArg::Int(i) => Ok(*i),
        other => Err(operand_type(opcode, index, "an integer", other)),
    }
}

fn count_arg(opcode: &str, args: &[RawArg], index: usize) -> Result<usize, TacError> {
    match &args[index] {
        RawArg::Int(i) if *i >= 0 => Ok(*i as usize),
        other => Err(operand_type(opcode, index, "a non-negative integer", other)),
    }
}

fn operand_type(opcode: &str, index: usize, expected: &'static str, found: &RawArg) -> TacError {
    TacError::OperandType {
        opcode: opcode.to_string(),
        index,
        expected,
        found: found.describe(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn decode(value: serde_json::Value) -> Result<Instr, TacError> {
        decode_instr(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn decodes_every_opcode_family() {
        assert_eq!(
            Ok(Instr::Bin(
                Name::temp("2"),
                BinOp::Mod,
                Value::temp("0"),
                Value::global("g")
            )),
            decode(json!({"opcode": "mod", "args": ["%0", "@g"], "result": "%2"}))
        );
        assert_eq!(
            Ok(Instr::CondJmp(CmpOp::NotEqual, Label::new("7"))),
            decode(json!({"opcode": "jnz", "args": [7], "result": null}))
        );
        assert_eq!(
            Ok(Instr::Call(None, "print".to_string(), 1)),
            decode(json!({"opcode": "call", "args": ["@print", 1], "result": null}))
        );
        assert_eq!(
            Ok(Instr::Ret(None)),
            decode(json!({"opcode": "ret", "args": []}))
        );
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        assert_eq!(
            Err(TacError::UnknownOpcode("phi".to_string())),
            decode(json!({"opcode": "phi", "args": [], "result": "%0"}))
        );
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(matches!(
            decode(json!({"opcode": "add", "args": ["%0"], "result": "%1"})),
            Err(TacError::Arity { found: 1, .. })
        ));
    }

    #[test]
    fn wrong_operand_type_is_rejected() {
        assert!(matches!(
            decode(json!({"opcode": "const", "args": ["%0"], "result": "%1"})),
            Err(TacError::OperandType { index: 0, .. })
        ));
        assert!(matches!(
            decode(json!({"opcode": "copy", "args": ["x"], "result": "%1"})),
            Err(TacError::OperandType { .. })
        ));
    }

    #[test]
    fn missing_result_is_rejected() {
        assert_eq!(
            Err(TacError::MissingResult("const".to_string())),
            decode(json!({"opcode": "const", "args": [1], "result": null}))
        );
    }

    #[test]
    fn errors_name_the_offending_instruction() {
        let source = json!([
            {"proc": "@main", "args": [], "body": [
                {"opcode": "nop", "args": [], "result": null},
                {"opcode": "frobnicate", "args": [], "result": null}
            ]}
        ])
        .to_string();

        let err = load_module(&source).unwrap_err();
        assert!(matches!(err, TacError::Instruction { index: 1, .. }));
        assert_eq!(
            "@main, instruction #1 (frobnicate): unknown opcode 'frobnicate'",
            err.to_string()
        );
    }

    #[test]
    fn document_round_trips_through_the_typed_model() {
        let document = json!([
            {"var": "@exception", "init": 0},
            {"proc": "@main", "args": ["%a", "%b"], "body": [
                {"opcode": "label", "args": [3], "result": null},
                {"opcode": "const", "args": [5], "result": "%0"},
                {"opcode": "cmpq", "args": ["%0", "@exception"], "result": null},
                {"opcode": "jz", "args": ["done"], "result": null},
                {"opcode": "param", "args": [1, "%0"], "result": null},
                {"opcode": "call", "args": ["@f", 1], "result": "%1"},
                {"opcode": "label", "args": ["done"], "result": null},
                {"opcode": "ret", "args": ["%a"], "result": null}
            ]}
        ]);
        let raw: Vec<RawDecl> = serde_json::from_value(document.clone()).unwrap();
        let module = decode_module(raw).unwrap();

        assert_eq!(document, serde_json::to_value(encode_module(&module)).unwrap());
    }
}
