use crate::{
    cfg::Cfg,
    prelude::*,
    tac::{Instr, Label},
};

/// Bypass blocks which do nothing but jump elsewhere. Every edge into such a
/// block is redirected to its target, keeping the edge's condition, and the
/// block is removed. The entry block and self-loops are left alone.
pub fn remove_useless_blocks(cfg: &mut Cfg) -> usize {
    let mut removed = 0;
    while let Some((useless, target)) = find_useless(cfg) {
        trace!("Bypassing block {} in favour of {}", useless, target);
        bypass(cfg, &useless, &target);
        removed += 1;
    }
    removed
}

fn find_useless(cfg: &Cfg) -> Option<(Label, Label)> {
    cfg.blocks().find_map(|block| match block.body.as_slice() {
        [Instr::Label(_), Instr::Jmp(target)]
            if !block.label.is_initial() && *target != block.label =>
        {
            Some((block.label.clone(), target.clone()))
        }
        _ => None,
    })
}

fn bypass(cfg: &mut Cfg, useless: &Label, target: &Label) {
    cfg.remove_edge(useless, target, |_| true);
    let Some(block) = cfg.blocks.remove(useless) else {
        return;
    };

    for edge in cfg.edges.iter_mut().filter(|e| &e.to == useless) {
        edge.to = target.clone();
    }
    for source in &block.predecessors {
        if let Some(pred) = cfg.blocks.get_mut(source) {
            pred.retarget(useless, target);
        }
    }
    if let Some(target) = cfg.blocks.get_mut(target) {
        target.predecessors.extend(block.predecessors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfg::{
            test_support::{graph_of, successors},
            Condition,
        },
        tac::{CmpOp, Value},
    };

    #[test]
    fn jumps_through_empty_blocks_are_redirected() {
        let mut cfg = graph_of(
            "
            cmpq %0, 1
            jz L1
            jmp L2
            L1:
            jmp L3
            L2:
            jmp L3
            L3:
            ret %0
            ",
        );

        assert_eq!(2, remove_useless_blocks(&mut cfg));
        cfg.verify().unwrap();

        assert_eq!(vec!["L3", "L3"], successors(&cfg, "initial"));
        let conditional = cfg
            .edges
            .iter()
            .find(|e| !e.condition.is_always())
            .unwrap();
        assert_eq!(
            Condition::Compare(Value::temp("0"), CmpOp::Equal, Value::Const(1)),
            conditional.condition
        );
        assert_eq!("L3", conditional.to.as_str());
        assert!(cfg.block(&Label::new("L1")).is_none());
    }

    #[test]
    fn entry_block_and_self_loops_are_kept() {
        let mut cfg = graph_of(
            "
            jmp L1
            L1:
            jmp L1
            ",
        );

        assert_eq!(0, remove_useless_blocks(&mut cfg));
        assert_eq!(2, cfg.len());
    }
}
