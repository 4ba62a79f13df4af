//! Compilation of an op graph into a verified native-stage module.
//!
//! A [`Compiler`] walks a fixed sequence of stages and never goes back:
//! graph ready, dialect built, dialect verified, optimized, optimized verified, handed off.
//! Any verification failure aborts the whole compilation and no module is returned.

use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use crate::backend::conversion::{convert_graph, ConversionError};
use crate::backend::dialect::{Module, ModuleSerdeError};
use crate::backend::init::LoweringContext;
use crate::backend::options::PassManagerOptions;
use crate::backend::passes::{
    DeadCodeEliminationPass, ModulePass, NativeLoweringPass, OpFusionPass, PassError, PassResult,
    StandardLoweringPass,
};
use crate::backend::verifier::{verify_module, VerificationReport};
use crate::ops::graph::Graph;

pub enum Step {
    Pass(Arc<dyn ModulePass>),
    FixedPoint { max_iters: usize, steps: Vec<Step> },
}

pub struct PipelineBuilder {
    steps: Vec<Step>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn pass(&mut self, pass: Arc<dyn ModulePass>) {
        self.steps.push(Step::Pass(pass));
    }

    pub fn fixed_point<F>(&mut self, max_iters: usize, build: F)
    where
        F: FnOnce(&mut PipelineBuilder),
    {
        let mut inner = PipelineBuilder::new();
        build(&mut inner);
        self.steps.push(Step::FixedPoint {
            max_iters: max_iters.max(1),
            steps: inner.steps,
        });
    }

    pub fn finish(self) -> Vec<Step> {
        self.steps
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed pass order: optional fusion rounds, dead code elimination, standard lowering, a second
/// dead code sweep for shape operands the standard form no longer reads, and native lowering.
pub fn default_pipeline(options: &PassManagerOptions) -> Vec<Step> {
    let mut builder = PipelineBuilder::new();
    if options.op_fusion {
        builder.fixed_point(options.max_fusion_rounds, |p| {
            p.pass(Arc::new(OpFusionPass::default()));
            p.pass(Arc::new(DeadCodeEliminationPass));
        });
    } else {
        builder.pass(Arc::new(DeadCodeEliminationPass));
    }
    builder.pass(Arc::new(StandardLoweringPass));
    builder.pass(Arc::new(DeadCodeEliminationPass));
    builder.pass(Arc::new(NativeLoweringPass));
    builder.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileStage {
    GraphReady,
    DialectBuilt,
    DialectVerified,
    Optimized,
    OptimizedVerified,
    HandedOff,
}

impl CompileStage {
    pub fn as_str(self) -> &'static str {
        match self {
            CompileStage::GraphReady => "graph-ready",
            CompileStage::DialectBuilt => "dialect-built",
            CompileStage::DialectVerified => "dialect-verified",
            CompileStage::Optimized => "optimized",
            CompileStage::OptimizedVerified => "optimized-verified",
            CompileStage::HandedOff => "handed-off",
        }
    }
}

impl fmt::Display for CompileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("graph conversion failed: {0}")]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Pass(#[from] PassError),
    #[error("verification failed at {stage}: {report}")]
    Verification {
        stage: CompileStage,
        report: VerificationReport,
    },
    #[error("verification failed after pass '{pass}': {report}")]
    PassVerification {
        pass: &'static str,
        report: VerificationReport,
    },
}

impl CompileError {
    pub fn report(&self) -> Option<&VerificationReport> {
        match self {
            CompileError::Verification { report, .. }
            | CompileError::PassVerification { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Result of a successful compilation.
#[derive(Debug, Clone)]
pub struct LoweredModule {
    module: Arc<Module>,
    stats: PassResult,
}

impl LoweredModule {
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn stats(&self) -> PassResult {
        self.stats
    }

    pub fn fingerprint(&self) -> Result<u64, ModuleSerdeError> {
        self.module.fingerprint()
    }
}

/// Compiles one graph. Each compiler owns its module exclusively.
pub struct Compiler<'g> {
    graph: &'g Graph,
    context: Arc<LoweringContext>,
    module_name: String,
    stage: CompileStage,
}

impl<'g> Compiler<'g> {
    pub fn new(graph: &'g Graph, context: Arc<LoweringContext>) -> Self {
        Self {
            graph,
            context,
            module_name: "opgraph".to_string(),
            stage: CompileStage::GraphReady,
        }
    }

    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    pub fn stage(&self) -> CompileStage {
        self.stage
    }

    pub fn compile(mut self) -> Result<LoweredModule, CompileError> {
        let mut module = convert_graph(self.graph, &self.module_name)?;
        self.advance(CompileStage::DialectBuilt, &module);

        self.verify(&module)?;
        self.advance(CompileStage::DialectVerified, &module);

        let steps = default_pipeline(self.context.options());
        let mut stats = PassResult::default();
        self.run_steps(&steps, &mut module, &mut stats)?;
        self.advance(CompileStage::Optimized, &module);

        self.verify(&module)?;
        self.advance(CompileStage::OptimizedVerified, &module);

        info!(
            "compiled module @{}: {} instructions, {} rewrites, {} erased",
            module.name,
            module.function.body.len(),
            stats.rewrites_applied,
            stats.erased_insts
        );
        self.advance(CompileStage::HandedOff, &module);
        Ok(LoweredModule {
            module: Arc::new(module),
            stats,
        })
    }

    fn advance(&mut self, next: CompileStage, module: &Module) {
        debug!("compile @{}: {} -> {next}", self.module_name, self.stage);
        self.stage = next;
        if self.context.options().print_ir_after_all {
            debug!("module after {next}:\n{module}");
        }
    }

    fn verify(&self, module: &Module) -> Result<(), CompileError> {
        let report = verify_module(module);
        if report.is_ok() {
            Ok(())
        } else {
            Err(CompileError::Verification {
                stage: self.stage,
                report,
            })
        }
    }

    fn run_steps(
        &self,
        steps: &[Step],
        module: &mut Module,
        totals: &mut PassResult,
    ) -> Result<bool, CompileError> {
        let options = self.context.options();
        let mut changed_any = false;
        for step in steps {
            match step {
                Step::Pass(pass) => {
                    let stats = pass.run(module)?;
                    debug!(
                        "pass '{}': changed={} rewrites={} erased={}",
                        pass.name(),
                        stats.changed,
                        stats.rewrites_applied,
                        stats.erased_insts
                    );
                    changed_any |= stats.changed;
                    *totals = totals.merge(stats);
                    if options.print_ir_after_all {
                        debug!("module after pass '{}':\n{module}", pass.name());
                    }
                    if options.verify_each {
                        let report = verify_module(module);
                        if !report.is_ok() {
                            return Err(CompileError::PassVerification {
                                pass: pass.name(),
                                report,
                            });
                        }
                    }
                }
                Step::FixedPoint { max_iters, steps } => {
                    let mut iter = 0usize;
                    loop {
                        if iter >= *max_iters {
                            break;
                        }
                        iter += 1;
                        let mut local = PassResult::default();
                        let changed = self.run_steps(steps, module, &mut local)?;
                        *totals = totals.merge(local);
                        changed_any |= changed;
                        if !changed {
                            break;
                        }
                    }
                }
            }
        }
        Ok(changed_any)
    }
}
