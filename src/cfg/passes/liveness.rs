use std::collections::{HashMap, HashSet, VecDeque};

use crate::{
    cfg::{Block, Cfg},
    tac::{Instr, Label, Name},
};

pub type LiveSet = HashSet<Name>;

/// Names live on entry to and exit from every block.
#[derive(Debug, Default)]
pub struct Liveness {
    live_in: HashMap<Label, LiveSet>,
    live_out: HashMap<Label, LiveSet>,
}
impl Liveness {
    /// Solve the backward liveness equations to a fixed point.
    pub fn compute(cfg: &Cfg) -> Self {
        let mut liveness = Liveness::default();

        // Visiting blocks from last to first lets most facts settle in one sweep.
        let mut worklist: VecDeque<Label> = cfg.labels().into_iter().rev().collect();
        let mut queued: HashSet<Label> = worklist.iter().cloned().collect();

        while let Some(label) = worklist.pop_front() {
            queued.remove(&label);
            let Some(block) = cfg.block(&label) else {
                continue;
            };

            let out: LiveSet = block
                .successors
                .iter()
                .filter_map(|succ| liveness.live_in.get(succ))
                .flatten()
                .cloned()
                .collect();
            let live_in = transfer(&block.body, out.clone());
            liveness.live_out.insert(label.clone(), out);

            if liveness.live_in.get(&label) != Some(&live_in) {
                liveness.live_in.insert(label.clone(), live_in);
                for pred in &block.predecessors {
                    if queued.insert(pred.clone()) {
                        worklist.push_back(pred.clone());
                    }
                }
            }
        }
        liveness
    }

    #[cfg(test)]
    pub fn live_in(&self, label: &Label) -> Option<&LiveSet> {
        self.live_in.get(label)
    }

    pub fn live_out(&self, label: &Label) -> Option<&LiveSet> {
        self.live_out.get(label)
    }

    /// The names live immediately after each instruction of the block.
    pub fn live_after(&self, block: &Block) -> Vec<LiveSet> {
        let mut live = self.live_out(&block.label).cloned().unwrap_or_default();
        let mut after = vec![LiveSet::new(); block.body.len()];
        for (pos, instr) in block.body.iter().enumerate().rev() {
            after[pos] = live.clone();
            step(instr, &mut live);
        }
        after
    }
}

fn transfer(body: &[Instr], mut live: LiveSet) -> LiveSet {
    for instr in body.iter().rev() {
        step(instr, &mut live);
    }
    live
}

/// Move the live set from after `instr` to before it.
fn step(instr: &Instr, live: &mut LiveSet) {
    if let Some(written) = instr.write() {
        live.remove(written);
    }
    live.extend(instr.reads().into_iter().cloned());
}
