//! Execution provider boundary.
//!
//! A provider turns a [`LoweredModule`] into an opaque [`Executable`] and hands out tensor
//! buffers through a [`TensorBufferProvider`]. Buffers can be allocated for a static shape, for
//! a partial shape (storage deferred until the shape is known), or wrap caller-owned memory.

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use thiserror::Error;

use crate::backend::dialect::{Module, Stage, TensorType};
use crate::backend::pipeline::LoweredModule;
use crate::tensor::{ElementType, PartialShape, Shape};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("element type {0} has no storage layout")]
    UnsupportedElementType(ElementType),
    #[error("shape {0} overflows addressable memory")]
    SizeOverflow(Shape),
    #[error("expected a native-stage module, got {0}")]
    WrongStage(Stage),
    #[error("expected {expected} arguments, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },
    #[error("argument {index} has type {actual}, expected {expected}")]
    ArgumentType {
        index: usize,
        expected: TensorType,
        actual: TensorType,
    },
    #[error("provider '{provider}' failed: {message}")]
    Backend { provider: String, message: String },
}

pub trait TensorBuffer: Send + Sync + fmt::Debug {
    fn element_type(&self) -> ElementType;

    fn shape(&self) -> &PartialShape;

    /// Bytes of storage currently backing the tensor; 0 while the shape is not static.
    fn byte_len(&self) -> usize;

    fn is_caller_owned(&self) -> bool;

    fn tensor_type(&self) -> TensorType {
        TensorType::new(self.element_type(), self.shape().clone())
    }
}

pub trait TensorBufferProvider: Send + Sync {
    fn create_tensor(
        &self,
        element_type: ElementType,
        shape: &Shape,
    ) -> Result<Arc<dyn TensorBuffer>, ProviderError>;

    fn create_dynamic_tensor(
        &self,
        element_type: ElementType,
        shape: &PartialShape,
    ) -> Result<Arc<dyn TensorBuffer>, ProviderError>;

    /// Wraps caller-owned memory without copying.
    ///
    /// # Safety
    ///
    /// `data` must point to at least `shape.num_elements()` elements of `element_type`, stay
    /// valid for the lifetime of the returned buffer, and not be mutated through other aliases
    /// while the buffer is in use.
    unsafe fn create_tensor_from_raw(
        &self,
        element_type: ElementType,
        shape: &Shape,
        data: NonNull<u8>,
    ) -> Result<Arc<dyn TensorBuffer>, ProviderError>;
}

/// Parameter and result types of a lowered module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub parameters: Vec<TensorType>,
    pub results: Vec<TensorType>,
}

impl Signature {
    pub fn of(module: &Module) -> Self {
        Self {
            parameters: module.function.parameters.clone(),
            results: module.function.results.clone(),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |types: &[TensorType]| {
            types
                .iter()
                .map(TensorType::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "({}) -> ({})", join(&self.parameters), join(&self.results))
    }
}

/// Prepared, immutable artifact produced by an [`ExecutionProvider`].
pub trait Executable: Send + Sync {
    fn signature(&self) -> &Signature;

    fn module(&self) -> &Arc<Module>;

    /// Checks argument count, element types and shape compatibility against the signature.
    fn check_arguments(&self, args: &[Arc<dyn TensorBuffer>]) -> Result<(), ProviderError> {
        let expected = &self.signature().parameters;
        if args.len() != expected.len() {
            return Err(ProviderError::ArgumentCount {
                expected: expected.len(),
                actual: args.len(),
            });
        }
        for (index, (arg, expected)) in args.iter().zip(expected.iter()).enumerate() {
            let actual = arg.tensor_type();
            if !actual.element_type.compatible(expected.element_type)
                || !actual.shape.compatible(&expected.shape)
            {
                return Err(ProviderError::ArgumentType {
                    index,
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

pub trait ExecutionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Buffer provider that allocates tensors compatible with this provider.
    fn buffers(&self) -> Arc<dyn TensorBufferProvider>;

    fn prepare(
        &self,
        lowered: &LoweredModule,
        buffers: Arc<dyn TensorBufferProvider>,
    ) -> Result<Arc<dyn Executable>, ProviderError>;
}
