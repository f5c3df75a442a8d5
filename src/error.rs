use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::{
    cfg::CfgError, codegen::LowerError, tac::interpreter::InterpretError, tac::TacError,
};

/// The sub-phase of the backend in which an error was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loading,
    BlockBuilding,
    GraphConstruction,
    Optimisation,
    Linearisation,
    Lowering,
    Interpretation,
}
impl Display for Stage {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Stage::Loading => "loading",
            Stage::BlockBuilding => "block building",
            Stage::GraphConstruction => "graph construction",
            Stage::Optimisation => "optimisation",
            Stage::Linearisation => "linearisation",
            Stage::Lowering => "lowering",
            Stage::Interpretation => "interpretation",
        })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error(transparent)]
    Tac(#[from] TacError),
    #[error(transparent)]
    Cfg(#[from] CfgError),
    #[error(transparent)]
    Lower(#[from] LowerError),
    #[error(transparent)]
    Interpret(#[from] InterpretError),
}

/// A fatal backend error, tagged with the stage that detected it and the
/// procedure it concerns (if any). Lowering of the module is aborted.
#[derive(Debug, Error)]
pub struct CompileError {
    stage: Stage,
    procedure: Option<String>,
    #[source]
    kind: ErrorKind,
}
impl CompileError {
    pub fn new<K: Into<ErrorKind>>(stage: Stage, procedure: Option<String>, kind: K) -> Self {
        Self {
            stage,
            procedure,
            kind: kind.into(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}
impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.procedure {
            Some(proc) => write!(f, "{} failed in @{}: {}", self.stage, proc, self.kind),
            None => write!(f, "{} failed: {}", self.stage, self.kind),
        }
    }
}

pub trait AddStage {
    type Tagged;

    /// Tag an error result with the stage and procedure in which it occurred.
    fn at_stage(self, stage: Stage, procedure: &str) -> Self::Tagged;
}

impl<O, E: Into<ErrorKind>> AddStage for Result<O, E> {
    type Tagged = Result<O, CompileError>;

    fn at_stage(self, stage: Stage, procedure: &str) -> Self::Tagged {
        self.map_err(|kind| CompileError::new(stage, Some(procedure.to_string()), kind))
    }
}
