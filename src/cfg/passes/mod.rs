//! Graph rewriting passes. Each pass returns the number of rewrites it made;
//! zero means it found nothing to do.

mod coalesce;
mod dead_store;
mod liveness;
mod threading;
mod unreachable;
mod useless;

pub use self::{
    coalesce::coalesce_blocks,
    dead_store::eliminate_dead_stores,
    liveness::Liveness,
    threading::thread_jumps,
    unreachable::remove_unreachable_blocks,
    useless::remove_useless_blocks,
};

/// A rewriting pass over a whole graph.
pub type Pass = fn(&mut super::Cfg) -> usize;
