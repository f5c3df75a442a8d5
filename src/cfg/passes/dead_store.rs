use super::Liveness;
use crate::{cfg::Cfg, prelude::*};

/// Delete instructions which write a name that is dead afterwards, unless
/// they have a side effect (a call, a parameter, a possibly trapping division
/// or a store to a global). Liveness is recomputed after every sweep until a
/// sweep deletes nothing.
pub fn eliminate_dead_stores(cfg: &mut Cfg) -> usize {
    // Every sweep but the last deletes at least one instruction.
    let max_sweeps = cfg.instruction_count() + 1;
    sweep_dead_stores(cfg, max_sweeps)
}

fn sweep_dead_stores(cfg: &mut Cfg, max_sweeps: usize) -> usize {
    let mut removed = 0;
    for _ in 0..max_sweeps {
        let liveness = Liveness::compute(cfg);
        let swept: usize = cfg
            .blocks
            .values_mut()
            .map(|block| {
                let live_after = liveness.live_after(block);
                let before = block.body.len();
                let mut pos = 0;
                block.body.retain(|instr| {
                    let keep = match instr.write() {
                        Some(written) if !instr.has_side_effect() => {
                            live_after[pos].contains(written)
                        }
                        _ => true,
                    };
                    if !keep {
                        trace!("Removing dead store {}", instr);
                    }
                    pos += 1;
                    keep
                });
                before - block.body.len()
            })
            .sum();

        if swept == 0 {
            break;
        }
        removed += swept;
    }
    removed
}
