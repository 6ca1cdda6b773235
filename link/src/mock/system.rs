use super::module::MockModule;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A mock system: module classes mapped to their ordered instances.
///
/// `Display` index 1 is the first `Display` module.
#[derive(Debug, Default)]
pub struct MockSystem {
    modules: HashMap<String, Vec<Arc<MockModule>>>,
}

impl MockSystem {
    pub fn builder() -> MockSystemBuilder {
        MockSystemBuilder::default()
    }

    /// Module `class` at 1-based `index`.
    pub fn module(&self, class: &str, index: u32) -> Option<Arc<MockModule>> {
        let position = usize::try_from(index.checked_sub(1)?).ok()?;
        self.modules.get(class)?.get(position).cloned()
    }

    /// Number of `class` modules.
    pub fn count(&self, class: &str) -> usize {
        self.modules.get(class).map_or(0, Vec::len)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

/// Builder for [`MockSystem`]. Modules of a class are indexed in the order
/// they are added.
#[derive(Debug, Default)]
pub struct MockSystemBuilder {
    modules: HashMap<String, Vec<Arc<MockModule>>>,
}

impl MockSystemBuilder {
    pub fn module(mut self, class: impl Into<String>, module: MockModule) -> Self {
        self.modules
            .entry(class.into())
            .or_default()
            .push(Arc::new(module));
        self
    }

    pub fn build(self) -> MockSystem {
        MockSystem {
            modules: self.modules,
        }
    }
}

/// Registry of mock systems served by the mock backend.
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct MockRegistry {
    systems: Arc<Mutex<HashMap<String, Arc<MockSystem>>>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn systems(&self) -> MutexGuard<'_, HashMap<String, Arc<MockSystem>>> {
        self.systems.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register (or replace) system `id`.
    pub fn register_system(&self, id: impl Into<String>, system: MockSystem) -> Arc<MockSystem> {
        let system = Arc::new(system);
        self.systems().insert(id.into(), system.clone());
        system
    }

    pub fn mock_system(&self, id: &str) -> Option<Arc<MockSystem>> {
        self.systems().get(id).cloned()
    }

    pub fn deregister_system(&self, id: &str) -> Option<Arc<MockSystem>> {
        self.systems().remove(id)
    }

    pub fn clear(&self) {
        self.systems().clear();
    }
}
