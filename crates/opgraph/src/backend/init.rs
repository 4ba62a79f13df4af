//! One-time initialization of the lowering machinery.
//!
//! A [`LoweringRuntime`] produces the shared [`LoweringContext`] exactly once. Callers racing to
//! initialize block on a mutex, and everyone observes the same fully built context. Compiling
//! through the process-wide runtime before it is initialized is a programming error.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use once_cell::sync::OnceCell;

use crate::backend::options::{InitError, PassManagerOptions};

/// Configuration threaded through every compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoweringContext {
    options: PassManagerOptions,
}

impl LoweringContext {
    pub fn new(options: PassManagerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PassManagerOptions {
        &self.options
    }
}

pub struct LoweringRuntime {
    context: OnceCell<Arc<LoweringContext>>,
    lock: Mutex<()>,
    init_count: AtomicUsize,
}

impl LoweringRuntime {
    pub const fn new() -> Self {
        Self {
            context: OnceCell::new(),
            lock: Mutex::new(()),
            init_count: AtomicUsize::new(0),
        }
    }

    /// Process-wide runtime used by [`compile_graph`](crate::backend::compile_graph).
    pub fn global() -> &'static LoweringRuntime {
        static RUNTIME: LoweringRuntime = LoweringRuntime::new();
        &RUNTIME
    }

    /// Initializes from `OPGRAPH_PASS_OPTIONS`. The variable is only parsed by the call that
    /// performs the initialization.
    pub fn initialize(&self) -> Result<Arc<LoweringContext>, InitError> {
        self.get_or_init(|| match crate::env::pass_options() {
            Some(src) => PassManagerOptions::parse(src),
            None => Ok(PassManagerOptions::default()),
        })
    }

    /// Initializes with explicit options. When already initialized, the existing context is
    /// returned unchanged.
    pub fn initialize_with(&self, options: PassManagerOptions) -> Arc<LoweringContext> {
        match self.get_or_init(|| Ok(options)) {
            Ok(context) => context,
            Err(_) => unreachable!("explicit options cannot fail to parse"),
        }
    }

    pub fn context(&self) -> Option<Arc<LoweringContext>> {
        self.context.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.context.get().is_some()
    }

    /// # Panics
    ///
    /// Panics when called before initialization.
    pub fn expect_initialized(&self) -> Arc<LoweringContext> {
        match self.context.get() {
            Some(context) => Arc::clone(context),
            None => panic!(
                "lowering runtime used before initialization; call LoweringRuntime::initialize first"
            ),
        }
    }

    /// Number of times initialization actually ran (0 or 1).
    pub fn initialization_count(&self) -> usize {
        self.init_count.load(Ordering::Acquire)
    }

    fn get_or_init<F>(&self, make_options: F) -> Result<Arc<LoweringContext>, InitError>
    where
        F: FnOnce() -> Result<PassManagerOptions, InitError>,
    {
        if let Some(context) = self.context.get() {
            return Ok(Arc::clone(context));
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(context) = self.context.get() {
            debug!("lowering runtime initialized by another caller");
            return Ok(Arc::clone(context));
        }

        let options = make_options()?;
        info!("initializing lowering runtime ({options})");
        let context = Arc::new(LoweringContext::new(options));
        self.init_count.fetch_add(1, Ordering::AcqRel);
        if self.context.set(Arc::clone(&context)).is_err() {
            unreachable!("lowering context set twice under the init lock");
        }
        Ok(context)
    }
}

impl Default for LoweringRuntime {
    fn default() -> Self {
        Self::new()
    }
}
