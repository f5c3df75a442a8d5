use crate::{cfg::Cfg, prelude::*};

/// Remove every block which cannot be reached from the entry block, along
/// with its edges.
pub fn remove_unreachable_blocks(cfg: &mut Cfg) -> usize {
    let reachable = cfg.reachable();
    let dead: Vec<_> = cfg
        .labels()
        .into_iter()
        .filter(|label| !reachable.contains(label))
        .collect();
    if dead.is_empty() {
        return 0;
    }

    for label in &dead {
        trace!("Removing unreachable block {}", label);
        cfg.blocks.remove(label);
    }
    cfg.edges
        .retain(|e| reachable.contains(&e.from) && reachable.contains(&e.to));
    for block in cfg.blocks.values_mut() {
        block.predecessors.retain(|p| reachable.contains(p));
    }
    dead.len()
}
