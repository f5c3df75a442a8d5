//! The three-address code consumed by the backend: the instruction model,
//! its JSON form, copy propagation over flat bodies and a reference
//! interpreter.

mod copy_propagation;
mod instr;
pub mod interpreter;
mod loader;
#[cfg(test)]
pub(crate) mod text;

pub use self::{
    copy_propagation::propagate_copies,
    instr::*,
    loader::{load_module, store_module, TacError},
};
