use super::status_variable::VariableBinding;
use crate::{
    dispatcher::CommandDispatcher,
    error::Result,
    models::RequestAddress,
    store::BindingStore,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Name used for the address of module-level commands (`debug`/`ignore`).
const MODULE_COMMAND_NAME: &str = "debug";

struct ModuleInner {
    sys: String,
    class: String,
    index: u32,
    dispatcher: Arc<CommandDispatcher>,
    store: Arc<BindingStore>,
    rebind_delay: Duration,
    bindings: Mutex<HashMap<String, VariableBinding>>,
}

/// Handle to one module (`Class_index`) of a system.
///
/// Clones share the same binding cache.
#[derive(Clone)]
pub struct ModuleBinding {
    inner: Arc<ModuleInner>,
}

impl fmt::Debug for ModuleBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBinding")
            .field("sys", &self.inner.sys)
            .field("id", &self.id())
            .finish()
    }
}

impl ModuleBinding {
    pub(crate) fn new(
        sys: impl Into<String>,
        class: impl Into<String>,
        index: u32,
        dispatcher: Arc<CommandDispatcher>,
        store: Arc<BindingStore>,
        rebind_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ModuleInner {
                sys: sys.into(),
                class: class.into(),
                index,
                dispatcher,
                store,
                rebind_delay,
                bindings: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// `Class_index` identifier.
    pub fn id(&self) -> String {
        format!("{}_{}", self.inner.class, self.inner.index)
    }

    /// Module class name.
    pub fn name(&self) -> &str {
        &self.inner.class
    }

    pub fn index(&self) -> u32 {
        self.inner.index
    }

    /// ID of the system this module belongs to.
    pub fn system_id(&self) -> &str {
        &self.inner.sys
    }

    fn address(&self, name: &str) -> RequestAddress {
        RequestAddress::new(
            self.inner.sys.clone(),
            self.inner.class.clone(),
            self.inner.index,
            name,
        )
    }

    /// Binding handle for status variable `name`. The same handle is
    /// returned for repeated calls.
    pub fn binding(&self, name: &str) -> VariableBinding {
        let mut bindings = self
            .inner
            .bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        bindings
            .entry(name.to_string())
            .or_insert_with(|| {
                VariableBinding::new(
                    self.address(name),
                    self.inner.dispatcher.clone(),
                    self.inner.store.clone(),
                    self.inner.rebind_delay,
                )
            })
            .clone()
    }

    /// Execute `method` on the module.
    pub async fn execute(&self, method: &str, args: Vec<JsonValue>) -> Result<JsonValue> {
        self.inner
            .dispatcher
            .execute(&self.address(method), args)
            .await
    }

    /// Execute with an explicit timeout (`None` waits indefinitely).
    pub async fn execute_with_timeout(
        &self,
        method: &str,
        args: Vec<JsonValue>,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        self.inner
            .dispatcher
            .execute_with_timeout(&self.address(method), args, timeout)
            .await
    }

    /// Start receiving this module's debug output on
    /// [`debug_events`](crate::PlaceLinkClient::debug_events).
    pub async fn debug(&self) -> Result<JsonValue> {
        self.debug_with_timeout(None).await
    }

    pub async fn debug_with_timeout(&self, timeout: Option<Duration>) -> Result<JsonValue> {
        self.inner
            .dispatcher
            .debug_with_timeout(&self.address(MODULE_COMMAND_NAME), timeout)
            .await
    }

    pub async fn ignore(&self) -> Result<JsonValue> {
        self.ignore_with_timeout(None).await
    }

    pub async fn ignore_with_timeout(&self, timeout: Option<Duration>) -> Result<JsonValue> {
        self.inner
            .dispatcher
            .ignore_with_timeout(&self.address(MODULE_COMMAND_NAME), timeout)
            .await
    }

    pub(crate) fn clear_bindings(&self) {
        self.inner
            .bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
