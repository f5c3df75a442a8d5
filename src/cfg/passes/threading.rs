use crate::{
    cfg::{Block, Cfg, Condition},
    prelude::*,
    tac::{CmpOp, Instr, Label, Value},
};

/// Settle conditional branches whose outcome is already known.
///
/// A branch is known when the only way into its block is an edge whose
/// condition decides the branch's own comparison (and nothing in the block
/// redefines the compared names), or when both of its operands are literals.
/// A branch known to be taken becomes an unconditional jump to its target;
/// one known not to be taken loses its conditional jump. Either way one edge
/// disappears, and the comparison goes too once no conditional jump reads it.
pub fn thread_jumps(cfg: &mut Cfg) -> usize {
    let mut settled = 0;
    while let Some((label, taken)) = find_settled_branch(cfg) {
        trace!(
            "Branch at the end of {} is {}",
            label,
            if taken { "always taken" } else { "never taken" }
        );
        settle(cfg, &label, taken);
        settled += 1;
    }
    settled
}

/// A block ending in `jcc taken; jmp fallthrough` with exactly those two
/// outgoing edges.
struct Branch {
    lhs: Value,
    op: CmpOp,
    rhs: Value,
    taken: Label,
    fallthrough: Label,
}

fn branch_of(cfg: &Cfg, block: &Block) -> Option<Branch> {
    let [.., Instr::CondJmp(_, taken), Instr::Jmp(fallthrough)] = block.body.as_slice() else {
        return None;
    };
    if block.trailing_jumps() != 2 {
        return None;
    }

    let outgoing: Vec<_> = cfg.edges.iter().filter(|e| e.from == block.label).collect();
    let [first, second] = outgoing.as_slice() else {
        return None;
    };
    let (conditional, always) = if first.condition.is_always() {
        (second, first)
    } else {
        (first, second)
    };
    let Condition::Compare(lhs, op, rhs) = &conditional.condition else {
        return None;
    };
    if !always.condition.is_always() || conditional.to != *taken || always.to != *fallthrough {
        return None;
    }

    Some(Branch {
        lhs: lhs.clone(),
        op: *op,
        rhs: rhs.clone(),
        taken: taken.clone(),
        fallthrough: fallthrough.clone(),
    })
}

fn find_settled_branch(cfg: &Cfg) -> Option<(Label, bool)> {
    find_implied_branch(cfg).or_else(|| find_constant_branch(cfg))
}

fn branch_at(cfg: &Cfg, label: &Label) -> Option<Branch> {
    cfg.block(label).and_then(|block| branch_of(cfg, block))
}

fn find_implied_branch(cfg: &Cfg) -> Option<(Label, bool)> {
    cfg.edges.iter().find_map(|edge| {
        let Condition::Compare(lhs, known, rhs) = &edge.condition else {
            return None;
        };
        let block = cfg.block(&edge.to)?;
        // The entry block is also reached when the procedure is called.
        if edge.from == edge.to || block.label.is_initial() || block.predecessors.len() != 1 {
            return None;
        }

        let branch = branch_of(cfg, block)?;
        let op = if branch.lhs == *lhs && branch.rhs == *rhs {
            branch.op
        } else if branch.lhs == *rhs && branch.rhs == *lhs {
            branch.op.mirrored()
        } else {
            return None;
        };

        let redefined = [lhs, rhs]
            .into_iter()
            .filter_map(Value::as_name)
            .any(|name| block.body.iter().any(|i| i.redefines(name)));
        if redefined {
            return None;
        }

        known.implies(op).map(|taken| (block.label.clone(), taken))
    })
}

fn find_constant_branch(cfg: &Cfg) -> Option<(Label, bool)> {
    cfg.blocks().find_map(|block| {
        let branch = branch_of(cfg, block)?;
        let (lhs, rhs) = (branch.lhs.as_const()?, branch.rhs.as_const()?);
        Some((block.label.clone(), branch.op.holds(lhs, rhs)))
    })
}

fn settle(cfg: &mut Cfg, label: &Label, taken: bool) {
    let Some(branch) = branch_at(cfg, label) else {
        return;
    };

    if taken {
        cfg.remove_edge(label, &branch.fallthrough, Condition::is_always);
        if let Some(edge) = cfg
            .edges
            .iter_mut()
            .find(|e| &e.from == label && e.to == branch.taken && !e.condition.is_always())
        {
            edge.condition = Condition::Always;
        }
    } else {
        cfg.remove_edge(label, &branch.taken, |c| !c.is_always());
    }

    let Some(block) = cfg.blocks.get_mut(label) else {
        return;
    };
    let jcc = block.body.len() - 2;
    if taken {
        block.body.truncate(jcc);
        block.body.push(Instr::Jmp(branch.taken));
    } else {
        block.body.remove(jcc);
    }
    drop_unused_comparison(&mut block.body);
}

fn drop_unused_comparison(body: &mut Vec<Instr>) {
    let Some(cmp) = body.iter().rposition(|i| matches!(i, Instr::Cmp(..))) else {
        return;
    };
    if !body[cmp..].iter().any(|i| matches!(i, Instr::CondJmp(..))) {
        body.remove(cmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::test_support::{graph_of, successors};

    fn body_of(cfg: &Cfg, label: &str) -> Vec<String> {
        cfg.block(&Label::new(label))
            .unwrap()
            .body
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    const NESTED: &str = "
        cmpq %a, %b
        jl L1
        jmp L3
        L1:
        %x = const 7
        cmpq {inner}
        jmp L3
        L2:
        ret %x
        L3:
        ret 0
        ";

    fn nested(inner: &str) -> Cfg {
        graph_of(&NESTED.replace("{inner}", inner))
    }

    #[test]
    fn implied_branch_becomes_unconditional() {
        let mut cfg = nested("%a, %b\n jle L2");

        assert_eq!(1, thread_jumps(&mut cfg));
        cfg.verify().unwrap();
        assert_eq!(vec!["L1:", "%x = const 7", "jmp L2"], body_of(&cfg, "L1"));
        assert_eq!(vec!["L2"], successors(&cfg, "L1"));
        assert!(cfg.edges.iter().all(|e| e.from.as_str() != "L1" || e.condition.is_always()));
    }

    #[test]
    fn contradicted_branch_is_dropped() {
        let mut cfg = nested("%a, %b\n jge L2");

        assert_eq!(1, thread_jumps(&mut cfg));
        cfg.verify().unwrap();
        assert_eq!(vec!["L1:", "%x = const 7", "jmp L3"], body_of(&cfg, "L1"));
        assert!(cfg.block(&Label::new("L2")).unwrap().predecessors.is_empty());
    }

    #[test]
    fn swapped_operands_use_the_mirrored_comparator() {
        let mut cfg = nested("%b, %a\n jg L2");

        assert_eq!(1, thread_jumps(&mut cfg));
        assert_eq!(vec!["L2"], successors(&cfg, "L1"));
    }

    #[test]
    fn undecidable_branch_is_kept() {
        let mut cfg = graph_of(
            "
            cmpq %a, %b
            jle L1
            jmp L3
            L1:
            cmpq %a, %b
            jz L2
            jmp L3
            L2:
            ret 1
            L3:
            ret 0
            ",
        );

        assert_eq!(0, thread_jumps(&mut cfg));
        assert_eq!(2, successors(&cfg, "L1").len());
    }

    #[test]
    fn redefinition_blocks_threading() {
        let mut cfg = graph_of(
            "
            cmpq %a, %b
            jl L1
            jmp L3
            L1:
            %a = add %a, 10
            cmpq %a, %b
            jl L2
            jmp L3
            L2:
            ret 1
            L3:
            ret 0
            ",
        );

        assert_eq!(0, thread_jumps(&mut cfg));
    }

    #[test]
    fn calls_block_threading_on_globals() {
        let mut cfg = graph_of(
            "
            cmpq @g, 0
            jz L1
            jmp L3
            L1:
            call @f, 0
            cmpq @g, 0
            jz L2
            jmp L3
            L2:
            ret 1
            L3:
            ret 0
            ",
        );

        assert_eq!(0, thread_jumps(&mut cfg));
    }

    #[test]
    fn constant_comparison_is_folded() {
        let mut cfg = graph_of(
            "
            %0 = const 5
            %1 = const 5
            cmpq %0, %1
            jz L1
            jmp L2
            L1:
            ret 1
            L2:
            ret 0
            ",
        );

        assert_eq!(1, thread_jumps(&mut cfg));
        cfg.verify().unwrap();
        assert_eq!(
            vec!["initial:", "%0 = const 5", "%1 = const 5", "jmp L1"],
            body_of(&cfg, "initial")
        );
        assert!(cfg.block(&Label::new("L2")).unwrap().predecessors.is_empty());
    }

    #[test]
    fn entry_block_is_never_threaded_into() {
        let mut cfg = graph_of(
            "
            L0:
            cmpq %a, %b
            jl L2
            jmp L1
            L1:
            cmpq %a, %b
            jl L0
            jmp L2
            L2:
            ret
            ",
        );

        assert_eq!(0, thread_jumps(&mut cfg));
    }
}
