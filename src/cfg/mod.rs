//! Control-flow graphs of TAC procedures.
//!
//! A procedure body is first split into basic blocks by [`build_blocks`],
//! then [`build_graph`] records the labelled edges between them. The passes
//! in [`passes`] rewrite the graph in place, keeping the adjacency lists and
//! the edge list in agreement, and [`linearize`] turns it back into a flat
//! instruction sequence.

mod builder;
mod graph;
mod label_generator;
mod linearizer;
mod optimiser;
pub mod passes;

use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Display, Formatter},
};

use thiserror::Error;

pub use self::{
    builder::build_blocks,
    graph::build_graph,
    label_generator::LabelGenerator,
    linearizer::linearize,
    optimiser::{optimise, OptimiserConfig, OptimiserReport},
};
use crate::{
    ext::{OrderedHashMap, RemoveWhere},
    tac::{CmpOp, Instr, Label, Value},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfgError {
    #[error("jump to undefined label '{0}'")]
    UndefinedLabel(Label),
    #[error("label '{0}' is defined more than once")]
    DuplicateLabel(Label),
    #[error("conditional jump in block '{0}' is not preceded by a comparison")]
    MissingCondition(Label),
    #[error("reference to unknown block '{0}'")]
    UnknownBlock(Label),
    #[error("edges from '{from}' to '{to}' disagree with the adjacency lists")]
    InconsistentEdge { from: Label, to: Label },
    #[error("block '{0}' does not start with its label or does not end in a jump or return")]
    MalformedBlock(Label),
}

/// A maximal straight-line run of instructions. The body starts with the
/// block's own label and ends with a jump or return; any further jumps sit in
/// a contiguous run at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub label: Label,
    pub body: Vec<Instr>,
    /// Targets of the trailing jumps, the last jump's target first.
    pub successors: Vec<Label>,
    pub predecessors: Vec<Label>,
}
impl Block {
    pub fn new(label: Label) -> Self {
        Self {
            body: vec![Instr::Label(label.clone())],
            label,
            successors: vec![],
            predecessors: vec![],
        }
    }

    /// The number of jumps in the run at the end of the body.
    pub fn trailing_jumps(&self) -> usize {
        self.body.iter().rev().take_while(|i| i.is_jump()).count()
    }

    /// Redirect every jump to `old` (and the matching successor entries) to `new`.
    pub fn retarget(&mut self, old: &Label, new: &Label) {
        for target in self.body.iter_mut().filter_map(Instr::jump_target_mut) {
            if target == old {
                *target = new.clone();
            }
        }
        for succ in self.successors.iter_mut().filter(|s| *s == old) {
            *succ = new.clone();
        }
    }

    fn is_well_formed(&self) -> bool {
        match self.body.as_slice() {
            [Instr::Label(first), inner @ .., last] => {
                *first == self.label
                    && last.is_control_transfer()
                    && inner.iter().all(|i| i.as_label().is_none())
            }
            _ => false,
        }
    }
}
impl Display for Block {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let names = |labels: &[Label]| {
            labels
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        writeln!(f, "block {} (from: {})", self.label, names(&self.predecessors))?;
        for instr in &self.body[1..] {
            writeln!(f, "    {}", instr)?;
        }
        writeln!(f, "  -> {}", names(&self.successors))
    }
}

/// The condition under which control follows an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    Always,
    /// Taken when `lhs <op> rhs` holds. An operand defined by a `const` in the
    /// source block is replaced by its literal.
    Compare(Value, CmpOp, Value),
}
impl Condition {
    pub fn is_always(&self) -> bool {
        matches!(self, Condition::Always)
    }
}
impl Display for Condition {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("always"),
            Condition::Compare(lhs, op, rhs) => write!(f, "{} {} {}", lhs, op, rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: Label,
    pub to: Label,
    pub condition: Condition,
}

/// The control-flow graph of a single procedure.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    blocks: OrderedHashMap<Label, Block>,
    edges: Vec<Edge>,
    labels: LabelGenerator,
}
impl Cfg {
    pub fn block(&self, label: &Label) -> Option<&Block> {
        self.blocks.get(label)
    }

    /// Blocks in creation order. The entry block comes first.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// A snapshot of the block labels in creation order, for passes which
    /// mutate the graph while walking it.
    pub fn labels(&self) -> Vec<Label> {
        self.blocks.keys().cloned().collect()
    }


    pub fn len(&self) -> usize {
        self.blocks.len()
    }


    /// The number of instructions across all blocks.
    pub fn instruction_count(&self) -> usize {
        self.blocks().map(|b| b.body.len()).sum()
    }

    fn block_mut(&mut self, label: &Label) -> Result<&mut Block, CfgError> {
        self.blocks
            .get_mut(label)
            .ok_or_else(|| CfgError::UnknownBlock(label.clone()))
    }

    fn add_block(&mut self, block: Block) -> Result<(), CfgError> {
        if self.blocks.contains_key(&block.label) {
            return Err(CfgError::DuplicateLabel(block.label));
        }
        self.blocks.insert(block.label.clone(), block);
        Ok(())
    }

    /// Record an edge, appending to the source's successors and the target's predecessors.
    fn add_edge(&mut self, from: Label, to: Label, condition: Condition) -> Result<(), CfgError> {
        if !self.blocks.contains_key(&to) {
            return Err(CfgError::UndefinedLabel(to));
        }
        self.block_mut(&from)?.successors.push(to.clone());
        self.block_mut(&to)?.predecessors.push(from.clone());
        self.edges.push(Edge {
            from,
            to,
            condition,
        });
        Ok(())
    }

    /// Remove one edge between the two blocks whose condition matches, keeping
    /// the adjacency lists in step.
    fn remove_edge<P>(&mut self, from: &Label, to: &Label, matches: P) -> Option<Edge>
    where
        P: Fn(&Condition) -> bool,
    {
        let edge = self
            .edges
            .find_remove(|e| &e.from == from && &e.to == to && matches(&e.condition))?;
        if let Some(source) = self.blocks.get_mut(from) {
            source.successors.remove_one(to);
        }
        if let Some(target) = self.blocks.get_mut(to) {
            target.predecessors.remove_one(from);
        }
        Some(edge)
    }

    /// Labels of all blocks reachable from the entry block.
    pub fn reachable(&self) -> HashSet<Label> {
        let mut seen = HashSet::new();
        let mut stack = vec![Label::initial()];
        while let Some(label) = stack.pop() {
            let Some(block) = self.block(&label) else {
                continue;
            };
            if seen.insert(label) {
                stack.extend(block.successors.iter().cloned());
            }
        }
        seen
    }

    /// Check the structural invariants of the graph: every block is well
    /// formed, and for every ordered pair of blocks the edge list, the
    /// successor lists and the predecessor lists agree on the number of edges.
    pub fn verify(&self) -> Result<(), CfgError> {
        #[derive(Default, PartialEq)]
        struct Counts {
            edges: usize,
            successors: usize,
            predecessors: usize,
        }

        let known = |label: &Label| {
            if self.blocks.contains_key(label) {
                Ok(())
            } else {
                Err(CfgError::UnknownBlock(label.clone()))
            }
        };

        let mut counts: HashMap<(&Label, &Label), Counts> = HashMap::new();
        for edge in &self.edges {
            known(&edge.from)?;
            known(&edge.to)?;
            counts.entry((&edge.from, &edge.to)).or_default().edges += 1;
        }
        for block in self.blocks() {
            if !block.is_well_formed() {
                return Err(CfgError::MalformedBlock(block.label.clone()));
            }
            for succ in &block.successors {
                known(succ)?;
                counts.entry((&block.label, succ)).or_default().successors += 1;
            }
            for pred in &block.predecessors {
                known(pred)?;
                counts.entry((pred, &block.label)).or_default().predecessors += 1;
            }
        }

        for ((from, to), count) in counts {
            if count.edges != count.successors || count.edges != count.predecessors {
                return Err(CfgError::InconsistentEdge {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }
        Ok(())
    }
}
impl Display for Cfg {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for block in self.blocks() {
            write!(f, "{}", block)?;
        }
        for edge in &self.edges {
            writeln!(f, "{} -> {} [{}]", edge.from, edge.to, edge.condition)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::tac::text::tac;

    /// Build the graph of a procedure body written in TAC notation.
    pub fn graph_of(source: &str) -> Cfg {
        let mut cfg = build_blocks(tac(source)).unwrap();
        build_graph(&mut cfg).unwrap();
        cfg.verify().unwrap();
        cfg
    }

    pub fn successors(cfg: &Cfg, label: &str) -> Vec<String> {
        cfg.block(&Label::new(label))
            .unwrap()
            .successors
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{test_support::graph_of, *};

    #[test]
    fn verify_detects_a_stale_predecessor() {
        let mut cfg = graph_of(
            "
            jmp L1
            L1:
            ret
            ",
        );
        cfg.blocks
            .get_mut(&Label::new("L1"))
            .unwrap()
            .predecessors
            .push(Label::initial());

        assert_eq!(
            Err(CfgError::InconsistentEdge {
                from: Label::initial(),
                to: Label::new("L1"),
            }),
            cfg.verify()
        );
    }

    #[test]
    fn removing_an_edge_updates_adjacency() {
        let mut cfg = graph_of(
            "
            cmpq %0, 1
            jz L1
            jmp L2
            L1:
            ret
            L2:
            ret
            ",
        );

        let removed = cfg.remove_edge(&Label::initial(), &Label::new("L2"), Condition::is_always);

        assert!(removed.is_some());
        assert_eq!(vec![Label::new("L1")], cfg.block(&Label::initial()).unwrap().successors);
        assert!(cfg.block(&Label::new("L2")).unwrap().predecessors.is_empty());
        assert_eq!(1, cfg.edges.len());
    }

    #[test]
    fn reachability_follows_successors() {
        let cfg = graph_of(
            "
            jmp L2
            L1:
            ret
            L2:
            ret
            ",
        );
        let reachable = cfg.reachable();

        assert!(reachable.contains(&Label::initial()));
        assert!(reachable.contains(&Label::new("L2")));
        assert!(!reachable.contains(&Label::new("L1")));
    }
}
