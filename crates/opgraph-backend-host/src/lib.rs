//! Host execution provider.
//!
//! Prepares native-stage modules into immutable executables kept in a cache keyed by module
//! fingerprint, and allocates host tensors in owned or caller-owned memory.

use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, Once, PoisonError};

use log::{debug, info};
use opgraph::backend::dialect::{Module, Stage, TensorType};
use opgraph::backend::{
    Executable, ExecutionProvider, LoweredModule, LoweringContext, ProviderError, Signature,
    TensorBuffer, TensorBufferProvider,
};
use opgraph::ops::Graph;
use opgraph::tensor::{ElementType, PartialShape, Shape};

/// Name the host provider is registered under.
pub const HOST_PROVIDER_NAME: &str = "host";

enum Storage {
    Owned(Box<[u8]>),
    Borrowed { ptr: NonNull<u8>, len: usize },
    /// Shape not static yet.
    Deferred,
}

pub struct HostTensor {
    element_type: ElementType,
    shape: PartialShape,
    storage: Storage,
}

// SAFETY: owned storage is plain bytes. Borrowed storage is only read, and the caller of
// `create_tensor_from_raw` guarantees the memory outlives the tensor without foreign mutation.
unsafe impl Send for HostTensor {}
unsafe impl Sync for HostTensor {}

impl HostTensor {
    /// Bytes backing the tensor; empty while storage is deferred.
    pub fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(bytes) => bytes,
            // SAFETY: see `create_tensor_from_raw`.
            Storage::Borrowed { ptr, len } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
            Storage::Deferred => &[],
        }
    }
}

impl fmt::Debug for HostTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = match self.storage {
            Storage::Owned(_) => "owned",
            Storage::Borrowed { .. } => "borrowed",
            Storage::Deferred => "deferred",
        };
        f.debug_struct("HostTensor")
            .field("element_type", &self.element_type)
            .field("shape", &self.shape)
            .field("storage", &storage)
            .field("bytes", &self.byte_len())
            .finish()
    }
}

impl TensorBuffer for HostTensor {
    fn element_type(&self) -> ElementType {
        self.element_type
    }

    fn shape(&self) -> &PartialShape {
        &self.shape
    }

    fn byte_len(&self) -> usize {
        self.bytes().len()
    }

    fn is_caller_owned(&self) -> bool {
        matches!(self.storage, Storage::Borrowed { .. })
    }
}

#[derive(Debug, Default)]
pub struct HostBufferProvider;

impl HostBufferProvider {
    fn static_byte_len(element_type: ElementType, shape: &Shape) -> Result<usize, ProviderError> {
        if !element_type.is_static() {
            return Err(ProviderError::UnsupportedElementType(element_type));
        }
        TensorType::new(element_type, shape.into())
            .byte_len()
            .ok_or_else(|| ProviderError::SizeOverflow(shape.clone()))
    }
}

impl TensorBufferProvider for HostBufferProvider {
    fn create_tensor(
        &self,
        element_type: ElementType,
        shape: &Shape,
    ) -> Result<Arc<dyn TensorBuffer>, ProviderError> {
        let len = Self::static_byte_len(element_type, shape)?;
        Ok(Arc::new(HostTensor {
            element_type,
            shape: shape.into(),
            storage: Storage::Owned(vec![0u8; len].into_boxed_slice()),
        }))
    }

    fn create_dynamic_tensor(
        &self,
        element_type: ElementType,
        shape: &PartialShape,
    ) -> Result<Arc<dyn TensorBuffer>, ProviderError> {
        if let Some(shape) = shape.to_shape() {
            return self.create_tensor(element_type, &shape);
        }
        if !element_type.is_static() {
            return Err(ProviderError::UnsupportedElementType(element_type));
        }
        Ok(Arc::new(HostTensor {
            element_type,
            shape: shape.clone(),
            storage: Storage::Deferred,
        }))
    }

    unsafe fn create_tensor_from_raw(
        &self,
        element_type: ElementType,
        shape: &Shape,
        data: NonNull<u8>,
    ) -> Result<Arc<dyn TensorBuffer>, ProviderError> {
        let len = Self::static_byte_len(element_type, shape)?;
        Ok(Arc::new(HostTensor {
            element_type,
            shape: shape.into(),
            storage: Storage::Borrowed { ptr: data, len },
        }))
    }
}

pub struct HostExecutable {
    signature: Signature,
    module: Arc<Module>,
    fingerprint: u64,
    buffers: Arc<dyn TensorBufferProvider>,
}

impl HostExecutable {
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Allocates one zeroed buffer per function result.
    pub fn allocate_results(&self) -> Result<Vec<Arc<dyn TensorBuffer>>, ProviderError> {
        self.signature
            .results
            .iter()
            .map(|ty| self.buffers.create_dynamic_tensor(ty.element_type, &ty.shape))
            .collect()
    }
}

impl Executable for HostExecutable {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn module(&self) -> &Arc<Module> {
        &self.module
    }
}

pub struct HostProvider {
    buffers: Arc<HostBufferProvider>,
    cache: Mutex<HashMap<u64, Arc<HostExecutable>>>,
}

impl HostProvider {
    pub fn new() -> Self {
        Self {
            buffers: Arc::new(HostBufferProvider),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct modules prepared so far.
    pub fn cached_executables(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Prepares `lowered` with this provider's own buffers.
    pub fn prepare_host(&self, lowered: &LoweredModule) -> Result<Arc<HostExecutable>, ProviderError> {
        self.prepare_with(lowered, self.buffers.clone())
    }

    fn prepare_with(
        &self,
        lowered: &LoweredModule,
        buffers: Arc<dyn TensorBufferProvider>,
    ) -> Result<Arc<HostExecutable>, ProviderError> {
        let module = lowered.module();
        if module.stage != Stage::Native {
            return Err(ProviderError::WrongStage(module.stage));
        }
        let fingerprint = lowered
            .fingerprint()
            .map_err(|err| self.backend_error(format!("fingerprint failed: {err}")))?;

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(executable) = cache.get(&fingerprint) {
            debug!("host: reusing prepared module @{} ({fingerprint:016x})", module.name);
            return Ok(executable.clone());
        }
        let executable = Arc::new(HostExecutable {
            signature: Signature::of(module),
            module: Arc::clone(module),
            fingerprint,
            buffers,
        });
        info!(
            "host: prepared module @{} {} ({fingerprint:016x})",
            module.name, executable.signature
        );
        cache.insert(fingerprint, executable.clone());
        Ok(executable)
    }

    fn backend_error(&self, message: impl Into<String>) -> ProviderError {
        ProviderError::Backend {
            provider: HOST_PROVIDER_NAME.to_string(),
            message: message.into(),
        }
    }
}

impl Default for HostProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionProvider for HostProvider {
    fn name(&self) -> &str {
        HOST_PROVIDER_NAME
    }

    fn buffers(&self) -> Arc<dyn TensorBufferProvider> {
        self.buffers.clone()
    }

    fn prepare(
        &self,
        lowered: &LoweredModule,
        buffers: Arc<dyn TensorBufferProvider>,
    ) -> Result<Arc<dyn Executable>, ProviderError> {
        let executable: Arc<dyn Executable> = self.prepare_with(lowered, buffers)?;
        Ok(executable)
    }
}

static REGISTER: Once = Once::new();

/// Registers the host provider under [`HOST_PROVIDER_NAME`]. Safe to call repeatedly.
pub fn register_host_backend() {
    REGISTER.call_once(|| {
        let provider = Arc::new(HostProvider::new());
        opgraph::backend::registry::register_provider(HOST_PROVIDER_NAME, move || {
            provider.clone() as Arc<dyn ExecutionProvider>
        });
    });
}

/// Registers the host provider if needed, compiles `graph` and prepares it.
pub fn compile_on_host(
    graph: &Graph,
    context: Arc<LoweringContext>,
) -> anyhow::Result<Arc<dyn Executable>> {
    register_host_backend();
    opgraph::backend::compile_for(graph, context, HOST_PROVIDER_NAME)
}
