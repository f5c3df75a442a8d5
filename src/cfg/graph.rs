use super::{Cfg, CfgError, Condition};
use crate::{
    prelude::*,
    tac::{CmpOp, Instr, Label, Value},
};

/// Record the edges implied by the trailing jumps of every block.
///
/// Jumps are visited from the last one backward, so the first successor of a
/// block is always the target of its final (unconditional) jump. Conditional
/// edges carry the comparison of the nearest preceding `cmpq`.
pub fn build_graph(cfg: &mut Cfg) -> Result<(), CfgError> {
    for label in cfg.labels() {
        let Some(block) = cfg.block(&label) else {
            continue;
        };
        let body = &block.body;
        let first_jump = body.len() - block.trailing_jumps();

        let mut outgoing = Vec::new();
        for pos in (first_jump..body.len()).rev() {
            match &body[pos] {
                Instr::Jmp(target) => outgoing.push((target.clone(), Condition::Always)),
                Instr::CondJmp(op, target) => {
                    let condition = branch_condition(&body[..pos], *op)
                        .ok_or_else(|| CfgError::MissingCondition(label.clone()))?;
                    outgoing.push((target.clone(), condition));
                }
                _ => {}
            }
        }

        for (target, condition) in outgoing {
            cfg.add_edge(label.clone(), target, condition)?;
        }
    }
    trace!("Recorded {} edges", cfg.edges.len());
    Ok(())
}

/// The condition under which a conditional jump placed after `before` is taken.
fn branch_condition(before: &[Instr], op: CmpOp) -> Option<Condition> {
    let cmp = before.iter().rposition(|i| matches!(i, Instr::Cmp(..)))?;
    let Instr::Cmp(lhs, rhs) = &before[cmp] else {
        return None;
    };
    let preceding = &before[..cmp];
    Some(Condition::Compare(
        resolve_literal(preceding, lhs),
        op,
        resolve_literal(preceding, rhs),
    ))
}

/// Replace a name by the literal it was last assigned in this block, if its
/// nearest definition is a `const`.
fn resolve_literal(before: &[Instr], value: &Value) -> Value {
    let Value::Name(name) = value else {
        return value.clone();
    };
    match before.iter().rev().find(|i| i.redefines(name)) {
        Some(Instr::Const(_, literal)) => Value::Const(*literal),
        _ => value.clone(),
    }
}
