use std::collections::HashMap;

use super::{Instr, Name, Procedure, Value};
use crate::prelude::*;

/// Replace reads of copied temporaries by the temporary they were copied
/// from, and remove the copies.
///
/// Optimises:
/// ```text
/// %1 = add %0, 2
/// %2 = copy %1
/// ret %2
/// ```
/// To:
/// ```text
/// %1 = add %0, 2
/// ret %1
/// ```
///
/// A copy `%d = copy %s` is only propagated when `%d` is assigned exactly
/// once in the procedure (parameters count as an assignment), every read of
/// `%d` follows the copy in the same straight-line run (no label in between,
/// and no jump or return before it), and `%s` is not written between the copy
/// and the last of those reads. Each read then sees the value `%s` had at the
/// copy, whatever the shape of the surrounding control flow. Chains of copies
/// collapse onto their first source. Returns the number of copies removed.
pub fn propagate_copies(proc: &mut Procedure) -> usize {
    let assignments = count_assignments(proc);

    let mut removed = vec![];
    for line in 0..proc.body.len() {
        let Some((dest, Value::Name(src))) = proc.body[line].as_copy() else {
            continue;
        };
        if !dest.is_temp() || !src.is_temp() || dest == src || assignments.get(dest) != Some(&1) {
            continue;
        }
        let (dest, src) = (dest.clone(), src.clone());
        let Some(end) = confined_reads(&proc.body, line, &dest, &src) else {
            continue;
        };

        let replacement = Value::Name(src);
        for instr in &mut proc.body[line + 1..end] {
            instr.replace_reads(|name| (*name == dest).then(|| replacement.clone()));
        }
        removed.push(line);
    }

    if !removed.is_empty() {
        debug!("Propagated {} copies in @{}", removed.len(), proc.name);
    }
    let count = removed.len();
    let mut line = 0;
    proc.body.retain(|_| {
        let keep = removed.binary_search(&line).is_err();
        line += 1;
        keep
    });
    count
}

fn count_assignments(proc: &Procedure) -> HashMap<Name, usize> {
    let mut assignments = HashMap::new();
    let written = proc.params.iter().chain(proc.body.iter().filter_map(Instr::write));
    for name in written {
        *assignments.entry(name.clone()).or_insert(0) += 1;
    }
    assignments
}

/// The end (exclusive) of the run after `body[copy]` which holds every read
/// of `dest`, or `None` if some read lies outside that run or follows a write
/// to `src`.
fn confined_reads(body: &[Instr], copy: usize, dest: &Name, src: &Name) -> Option<usize> {
    let mut end = copy + 1;
    let mut src_written = false;
    for (pos, instr) in body.iter().enumerate().skip(copy + 1) {
        if instr.as_label().is_some() {
            break;
        }
        if instr.reads_from_name(dest) {
            if src_written {
                return None;
            }
            end = pos + 1;
        }
        if instr.write() == Some(src) {
            src_written = true;
        }
        if matches!(instr, Instr::Jmp(_) | Instr::Ret(_)) {
            break;
        }
    }

    let read_elsewhere = body
        .iter()
        .enumerate()
        .any(|(pos, instr)| (pos <= copy || pos >= end) && instr.reads_from_name(dest));
    (!read_elsewhere).then_some(end)
}
