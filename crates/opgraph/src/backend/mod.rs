//! Lowering of op graphs to dialect modules and the execution provider boundary.
//!
//! ```
//! use opgraph::backend::{LoweringRuntime, Compiler, PassManagerOptions};
//! use opgraph::backend::dialect::Stage;
//! use opgraph::ops::{self, Graph};
//! use opgraph::tensor::{AxisSet, ElementType, Shape};
//!
//! let mut graph = Graph::new();
//! let x = ops::v0::parameter(&mut graph, ElementType::F32, Shape::new(vec![3]));
//! let y = ops::v0::broadcast(&mut graph, x, Shape::new(vec![2, 3]), AxisSet::from([0])).unwrap();
//! graph.add_result(y);
//!
//! let runtime = LoweringRuntime::new();
//! let context = runtime.initialize_with(PassManagerOptions::default());
//! let lowered = Compiler::new(&graph, context).compile().unwrap();
//! assert_eq!(lowered.module().stage, Stage::Native);
//! ```

pub mod conversion;
pub mod dialect;
pub mod index;
pub mod init;
pub mod options;
pub mod passes;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod shape_helpers;
pub mod verifier;

use std::sync::Arc;

use anyhow::{anyhow, Context};

pub use init::{LoweringContext, LoweringRuntime};
pub use options::{InitError, PassManagerOptions};
pub use pipeline::{CompileError, CompileStage, Compiler, LoweredModule};
pub use provider::{
    Executable, ExecutionProvider, ProviderError, Signature, TensorBuffer, TensorBufferProvider,
};

use crate::ops::graph::Graph;

/// Compiles `graph` with the process-wide lowering context.
///
/// # Panics
///
/// Panics when [`LoweringRuntime::global`] has not been initialized.
pub fn compile_graph(graph: &Graph) -> Result<LoweredModule, CompileError> {
    let context = LoweringRuntime::global().expect_initialized();
    Compiler::new(graph, context).compile()
}

/// Compiles `graph` and prepares it on the registered provider `provider`.
pub fn compile_for(
    graph: &Graph,
    context: Arc<LoweringContext>,
    provider: &str,
) -> anyhow::Result<Arc<dyn Executable>> {
    let provider = registry::create_provider(provider)
        .ok_or_else(|| anyhow!("execution provider '{provider}' is not registered"))?;
    let lowered = Compiler::new(graph, context)
        .compile()
        .context("compilation failed")?;
    let executable = provider
        .prepare(&lowered, provider.buffers())
        .with_context(|| format!("provider '{}' rejected the module", provider.name()))?;
    Ok(executable)
}
