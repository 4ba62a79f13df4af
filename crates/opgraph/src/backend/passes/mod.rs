//! Module passes run by the lowering pipeline.

mod dce;
mod fusion;
mod native_lowering;
mod standard_lowering;

pub use dce::DeadCodeEliminationPass;
pub use fusion::{CollapseBroadcastChain, EliminateIdentityBroadcast, OpFusionPass};
pub use native_lowering::NativeLoweringPass;
pub use standard_lowering::StandardLoweringPass;

use thiserror::Error;

use crate::backend::dialect::{Module, Stage};

/// Statistics reported by a single pass run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassResult {
    /// Whether the pass changed the module.
    pub changed: bool,
    /// Number of rewrite iterations executed while applying the pass.
    pub iterations: usize,
    /// Total number of rewrites applied by the pass.
    pub rewrites_applied: usize,
    /// Instructions removed by the pass.
    pub erased_insts: usize,
}

impl PassResult {
    /// Merges two run results, accumulating statistics.
    pub fn merge(self, other: PassResult) -> PassResult {
        PassResult {
            changed: self.changed || other.changed,
            iterations: self.iterations + other.iterations,
            rewrites_applied: self.rewrites_applied + other.rewrites_applied,
            erased_insts: self.erased_insts + other.erased_insts,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PassError {
    #[error("pass '{pass}' expects a {expected}-stage module, got {found}")]
    WrongStage {
        pass: &'static str,
        expected: Stage,
        found: Stage,
    },
    #[error("pass '{pass}' cannot lower instruction {instruction}: {reason}")]
    Unsupported {
        pass: &'static str,
        instruction: String,
        reason: String,
    },
}

/// Interface implemented by module-level passes.
pub trait ModulePass: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, module: &mut Module) -> Result<PassResult, PassError>;
}

pub(crate) fn expect_stage(pass: &'static str, module: &Module, expected: Stage) -> Result<(), PassError> {
    if module.stage == expected {
        Ok(())
    } else {
        Err(PassError::WrongStage {
            pass,
            expected,
            found: module.stage,
        })
    }
}
