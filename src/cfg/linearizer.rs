use std::collections::HashSet;

use super::{Cfg, CfgError};
use crate::{
    prelude::*,
    tac::{Instr, Label},
};

/// Flatten the graph back into an instruction sequence.
///
/// Blocks are laid out by following the first unvisited successor of the
/// block just placed, so that the final jump of a block tends to target the
/// block right after it. When a chain ends, layout resumes with the first
/// unplaced block in creation order. Every block appears exactly once and
/// the entry block comes first.
pub fn linearize(mut cfg: Cfg) -> Result<Vec<Instr>, CfgError> {
    let mut placed: HashSet<Label> = HashSet::new();
    let mut order = Vec::with_capacity(cfg.len());
    let mut next = Some(Label::initial());

    loop {
        let label = match next.take() {
            Some(label) => label,
            None => match cfg.blocks.keys().find(|l| !placed.contains(*l)) {
                Some(label) => label.clone(),
                None => break,
            },
        };
        let block = cfg
            .block(&label)
            .ok_or_else(|| CfgError::UnknownBlock(label.clone()))?;
        next = block
            .successors
            .iter()
            .find(|s| !placed.contains(*s) && **s != label)
            .cloned();
        placed.insert(label.clone());
        order.push(label);
    }

    let mut body = Vec::with_capacity(cfg.instruction_count());
    for label in order {
        let block = cfg
            .blocks
            .remove(&label)
            .ok_or_else(|| CfgError::UnknownBlock(label.clone()))?;
        body.extend(block.body);
    }
    trace!("Linearised into {} instructions", body.len());
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cfg::test_support::graph_of, tac::text::tac};

    fn labels_in(body: &[Instr]) -> Vec<&str> {
        body.iter()
            .filter_map(Instr::as_label)
            .map(Label::as_str)
            .collect()
    }

    #[test]
    fn chains_follow_first_successor() {
        let cfg = graph_of(
            "
            jmp L3
            L2:
            ret 2
            L3:
            cmpq %0, 0
            jz L2
            jmp L4
            L4:
            ret 4
            ",
        );

        let body = linearize(cfg).unwrap();

        assert_eq!(vec!["initial", "L3", "L4", "L2"], labels_in(&body));
    }

    #[test]
    fn every_instruction_is_kept() {
        let source = "
            %0 = const 1
            L1:
            %0 = add %0, 1
            cmpq %0, 10
            jl L1
            jmp L9
            L5:
            ret 5
            L9:
            ret %0
            ";
        let cfg = graph_of(source);
        let mut before: Vec<String> = cfg
            .blocks()
            .flat_map(|b| b.body.iter().map(ToString::to_string))
            .collect();

        let mut after: Vec<String> = linearize(cfg)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!("initial:", after[0]);
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn source_instructions_survive_the_round_trip() {
        let source = "
            %x = const 1
            cmpq %x, 2
            jl L1
            %y = const 2
            L1:
            ret %x
            %z = const 3
            L2:
            %w = add %x, 1
            cmpq %w, 0
            jz L2
            ";
        let mut output = linearize(graph_of(source)).unwrap();

        for instr in tac(source) {
            let pos = output
                .iter()
                .position(|out| *out == instr)
                .unwrap_or_else(|| panic!("{} was lost", instr));
            output.remove(pos);
        }

        let added_by_builder = |instr: &Instr| match instr {
            Instr::Label(label) => label.is_initial() || label.as_str().starts_with("b_"),
            Instr::Jmp(_) | Instr::Ret(None) => true,
            _ => false,
        };
        assert!(!output.is_empty());
        assert!(output.iter().all(added_by_builder), "{:?}", output);
    }
}
