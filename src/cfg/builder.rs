use std::{collections::HashSet, mem};

use super::{Block, Cfg, CfgError, LabelGenerator};
use crate::{prelude::*, tac::Instr, tac::Label};

/// Prefix of labels minted for blocks which have none in the source.
const FRESH_LABEL: &str = "b";

/// Split a procedure body into basic blocks.
///
/// The entry block is always labelled `initial`: a body starting with some
/// other label has that label renamed, and an unlabelled body gets one. A
/// block which would fall through into the next label is closed with an
/// explicit jump, and a body which falls off its end is closed with `ret`.
/// The resulting graph has no edges yet; see [`super::build_graph`].
pub fn build_blocks(body: Vec<Instr>) -> Result<Cfg, CfgError> {
    let body = canonicalise_entry(body)?;
    let mut builder = BlockBuilder {
        cfg: Cfg::default(),
        labels: LabelGenerator::avoiding(body.iter().filter_map(Instr::as_label).cloned()),
        current: Block::new(Label::initial()),
    };

    let mut instrs = body.into_iter().skip(1).peekable();
    while let Some(instr) = instrs.next() {
        let next = instrs.peek();
        match instr {
            Instr::Label(label) => builder.open_labelled(label)?,
            Instr::Jmp(_) | Instr::Ret(_) => {
                builder.current.body.push(instr);
                // Code after an unconditional transfer can only be reached
                // through a label; without one it starts an unreachable block.
                if !matches!(next, None | Some(Instr::Label(_))) {
                    builder.open_fresh()?;
                }
            }
            Instr::CondJmp(..) => {
                builder.current.body.push(instr);
                let stays_in_block = match next {
                    None => true,
                    Some(next) => next.is_jump() || next.as_label().is_some(),
                };
                if !stays_in_block {
                    let fresh = builder.labels.next_label(FRESH_LABEL);
                    builder.current.body.push(Instr::Jmp(fresh.clone()));
                    builder.open(fresh)?;
                }
            }
            other => builder.current.body.push(other),
        }
    }
    builder.finish()
}

struct BlockBuilder {
    cfg: Cfg,
    labels: LabelGenerator,
    current: Block,
}
impl BlockBuilder {
    fn open(&mut self, label: Label) -> Result<(), CfgError> {
        let finished = mem::replace(&mut self.current, Block::new(label));
        self.cfg.add_block(finished)
    }

    fn open_fresh(&mut self) -> Result<(), CfgError> {
        let fresh = self.labels.next_label(FRESH_LABEL);
        self.open(fresh)
    }

    fn open_labelled(&mut self, label: Label) -> Result<(), CfgError> {
        if !ends_unconditionally(&self.current) {
            self.current.body.push(Instr::Jmp(label.clone()));
        }
        self.open(label)
    }

    fn finish(mut self) -> Result<Cfg, CfgError> {
        match self.current.body.last() {
            Some(Instr::CondJmp(..)) => {
                let fresh = self.labels.next_label(FRESH_LABEL);
                self.current.body.push(Instr::Jmp(fresh.clone()));
                self.open(fresh)?;
                self.current.body.push(Instr::Ret(None));
            }
            _ if !ends_unconditionally(&self.current) => self.current.body.push(Instr::Ret(None)),
            _ => {}
        }
        let last = mem::replace(&mut self.current, Block::new(Label::initial()));
        self.cfg.add_block(last)?;

        for block in self.cfg.blocks() {
            for target in block.body.iter().filter_map(Instr::jump_target) {
                if self.cfg.block(target).is_none() {
                    return Err(CfgError::UndefinedLabel(target.clone()));
                }
            }
        }

        self.cfg.labels = self.labels;
        trace!("Split procedure into {} blocks", self.cfg.len());
        Ok(self.cfg)
    }
}

fn ends_unconditionally(block: &Block) -> bool {
    matches!(block.body.last(), Some(Instr::Jmp(_) | Instr::Ret(_)))
}

/// Make sure the body starts with the `initial` label, renaming a leading
/// label (and every jump to it) if necessary.
fn canonicalise_entry(mut body: Vec<Instr>) -> Result<Vec<Instr>, CfgError> {
    check_unique_labels(&body)?;
    let later_initial = |body: &[Instr]| {
        body.iter()
            .skip(1)
            .filter_map(Instr::as_label)
            .any(Label::is_initial)
    };

    match body.first() {
        Some(Instr::Label(first)) if first.is_initial() => {}
        Some(Instr::Label(first)) => {
            let first = first.clone();
            if later_initial(&body) {
                return Err(CfgError::DuplicateLabel(Label::initial()));
            }
            body[0] = Instr::Label(Label::initial());
            for target in body.iter_mut().filter_map(Instr::jump_target_mut) {
                if *target == first {
                    *target = Label::initial();
                }
            }
        }
        _ => {
            body.insert(0, Instr::Label(Label::initial()));
            if later_initial(&body) {
                return Err(CfgError::DuplicateLabel(Label::initial()));
            }
        }
    }
    Ok(body)
}

fn check_unique_labels(body: &[Instr]) -> Result<(), CfgError> {
    let mut seen = HashSet::new();
    for label in body.iter().filter_map(Instr::as_label) {
        if !seen.insert(label) {
            return Err(CfgError::DuplicateLabel(label.clone()));
        }
    }
    Ok(())
}
