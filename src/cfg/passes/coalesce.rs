use crate::{
    cfg::Cfg,
    prelude::*,
    tac::{Instr, Label},
};

/// Merge a block into its only predecessor when that predecessor's only
/// successor is the block. The predecessor's final jump is replaced by the
/// merged block's body, and the merged block's outgoing edges now leave the
/// predecessor.
pub fn coalesce_blocks(cfg: &mut Cfg) -> usize {
    let mut merged = 0;
    while let Some((first, second)) = find_pair(cfg) {
        trace!("Coalescing block {} into {}", second, first);
        merge(cfg, &first, &second);
        merged += 1;
    }
    merged
}

fn find_pair(cfg: &Cfg) -> Option<(Label, Label)> {
    cfg.blocks().find_map(|block| {
        let [next] = block.successors.as_slice() else {
            return None;
        };
        let candidate = cfg.block(next)?;
        let jumps_there = matches!(block.body.last(), Some(Instr::Jmp(target)) if target == next);

        (jumps_there
            && *next != block.label
            && !next.is_initial()
            && candidate.predecessors.len() == 1)
            .then(|| (block.label.clone(), next.clone()))
    })
}

fn merge(cfg: &mut Cfg, first: &Label, second: &Label) {
    cfg.remove_edge(first, second, |_| true);
    let Some(absorbed) = cfg.blocks.remove(second) else {
        return;
    };

    for edge in cfg.edges.iter_mut().filter(|e| &e.from == second) {
        edge.from = first.clone();
    }
    for succ in &absorbed.successors {
        if let Some(block) = cfg.blocks.get_mut(succ) {
            for pred in block.predecessors.iter_mut().filter(|p| *p == second) {
                *pred = first.clone();
            }
        }
    }
    if let Some(block) = cfg.blocks.get_mut(first) {
        block.body.pop();
        block.body.extend(absorbed.body.into_iter().skip(1));
        block.successors = absorbed.successors;
    }
}
