//! Runtime provider registry for selecting execution providers by name.
//!
//! Providers register a factory once per process, typically from their crate's registration
//! function, and callers create instances by name.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use log::{debug, warn};

use super::provider::ExecutionProvider;

/// Factory function that creates a new provider instance.
pub type ProviderConstructor = Box<dyn Fn() -> Arc<dyn ExecutionProvider> + Send + Sync>;

/// Global registry mapping provider names to constructors.
struct ProviderRegistry {
    providers: RwLock<HashMap<String, ProviderConstructor>>,
}

impl ProviderRegistry {
    fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: ProviderConstructor) -> bool {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        if providers.contains_key(&name) {
            warn!("execution provider '{name}' is already registered");
            return false;
        }
        debug!("registered execution provider '{name}'");
        providers.insert(name, constructor);
        true
    }

    fn create(&self, name: &str) -> Option<Arc<dyn ExecutionProvider>> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let constructor = providers.get(name)?;
        Some(constructor())
    }

    fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn has_provider(&self, name: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

static GLOBAL_REGISTRY: OnceLock<ProviderRegistry> = OnceLock::new();

fn global_registry() -> &'static ProviderRegistry {
    GLOBAL_REGISTRY.get_or_init(ProviderRegistry::new)
}

/// Register a provider by name with a constructor function.
///
/// Registration happens once per name; a second registration under the same name is ignored
/// and returns `false`.
///
/// # Example
/// ```ignore
/// use opgraph::backend::registry::register_provider;
///
/// pub fn register() {
///     register_provider("my_provider", || Arc::new(MyProvider::default()));
/// }
/// ```
pub fn register_provider<F>(name: impl Into<String>, constructor: F) -> bool
where
    F: Fn() -> Arc<dyn ExecutionProvider> + Send + Sync + 'static,
{
    global_registry().register(name.into(), Box::new(constructor))
}

/// Create a provider instance by name.
///
/// Returns `None` if no provider with the given name has been registered.
pub fn create_provider(name: &str) -> Option<Arc<dyn ExecutionProvider>> {
    global_registry().create(name)
}

/// List all registered provider names, sorted.
pub fn list_providers() -> Vec<String> {
    global_registry().list_providers()
}

/// Check if a provider with the given name is registered.
pub fn has_provider(name: &str) -> bool {
    global_registry().has_provider(name)
}
