use super::module::ModuleBinding;
use crate::{
    dispatcher::CommandDispatcher,
    error::{PlaceLinkError, Result},
    store::BindingStore,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Split a `Class_index` module id.
///
/// The index is the numeric suffix after the last `_`; it defaults to 1
/// when missing, unparsable or not positive.
pub fn parse_module_id(id: &str) -> Result<(String, u32)> {
    let (class, index) = match id.rsplit_once('_') {
        Some((class, suffix)) => match suffix.parse::<i64>() {
            Ok(index) => (class, index),
            Err(_) => (id, 1),
        },
        None => (id, 1),
    };
    if class.is_empty() {
        return Err(PlaceLinkError::ConfigurationError(format!(
            "Invalid module id '{}': class name is empty",
            id
        )));
    }
    let index = u32::try_from(index).ok().filter(|i| *i > 0).unwrap_or(1);
    Ok((class.to_string(), index))
}

struct SystemInner {
    id: String,
    dispatcher: Arc<CommandDispatcher>,
    store: Arc<BindingStore>,
    rebind_delay: Duration,
    modules: Mutex<HashMap<(String, u32), ModuleBinding>>,
}

/// Handle to one system.
#[derive(Clone)]
pub struct SystemBinding {
    inner: Arc<SystemInner>,
}

impl fmt::Debug for SystemBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemBinding")
            .field("id", &self.inner.id)
            .finish()
    }
}

impl SystemBinding {
    pub(crate) fn new(
        id: impl Into<String>,
        dispatcher: Arc<CommandDispatcher>,
        store: Arc<BindingStore>,
        rebind_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SystemInner {
                id: id.into(),
                dispatcher,
                store,
                rebind_delay,
                modules: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Module handle for `Class_index` (e.g. `"Display_2"`; `"Display"`
    /// means index 1).
    pub fn module(&self, id: &str) -> Result<ModuleBinding> {
        let (class, index) = parse_module_id(id)?;
        Ok(self.module_at(&class, index))
    }

    /// Module handle for an already split class name and 1-based index.
    pub fn module_at(&self, class: &str, index: u32) -> ModuleBinding {
        let index = index.max(1);
        let mut modules = self
            .inner
            .modules
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        modules
            .entry((class.to_string(), index))
            .or_insert_with(|| {
                ModuleBinding::new(
                    self.inner.id.clone(),
                    class,
                    index,
                    self.inner.dispatcher.clone(),
                    self.inner.store.clone(),
                    self.inner.rebind_delay,
                )
            })
            .clone()
    }

    pub(crate) fn clear_modules(&self) {
        let mut modules = self
            .inner
            .modules
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for module in modules.values() {
            module.clear_bindings();
        }
        modules.clear();
    }
}
