use super::system::MockSystem;
use serde_json::Value as JsonValue;
use std::collections::{hash_map::Entry, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// What a mock method can see when it is called.
pub struct MockCallContext<'a> {
    /// The module the method belongs to
    pub module: &'a MockModule,
    /// The system the module is registered in, when called through the
    /// mock backend
    pub system: Option<&'a MockSystem>,
}

/// Logic of a mock module method.
pub type MockMethod = Arc<dyn Fn(&MockCallContext<'_>, &[JsonValue]) -> JsonValue + Send + Sync>;

/// In-process stand-in for a driver module: observable properties plus
/// callable methods.
///
/// # Examples
///
/// ```rust
/// use place_link::MockModule;
/// use serde_json::json;
///
/// let display = MockModule::builder()
///     .property("power", json!(false))
///     .method("power", |ctx, args| {
///         let state = args.first().cloned().unwrap_or(json!(false));
///         ctx.module.set("power", state.clone());
///         state
///     })
///     .build();
///
/// assert_eq!(display.call("power", &[json!(true)]), json!(true));
/// assert_eq!(display.get("power"), Some(json!(true)));
/// ```
#[derive(Default)]
pub struct MockModule {
    properties: Mutex<HashMap<String, watch::Sender<JsonValue>>>,
    methods: HashMap<String, MockMethod>,
}

impl fmt::Debug for MockModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut properties: Vec<String> = self.properties().keys().cloned().collect();
        properties.sort();
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("MockModule")
            .field("properties", &properties)
            .field("methods", &methods)
            .finish()
    }
}

/// Method names may be written with the `$` prefix used by driver
/// definitions; it is not part of the name.
fn method_key(name: &str) -> &str {
    name.strip_prefix('$').unwrap_or(name)
}

impl MockModule {
    pub fn builder() -> MockModuleBuilder {
        MockModuleBuilder::default()
    }

    fn properties(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<JsonValue>>> {
        self.properties.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current value of property `name`.
    pub fn get(&self, name: &str) -> Option<JsonValue> {
        self.properties()
            .get(name)
            .map(|sender| sender.borrow().clone())
    }

    /// Set property `name`, creating it when missing. Every listener is
    /// notified, even when the value is unchanged.
    pub fn set(&self, name: &str, value: JsonValue) {
        match self.properties().entry(name.to_string()) {
            Entry::Occupied(entry) => {
                entry.get().send_replace(value);
            },
            Entry::Vacant(entry) => {
                entry.insert(watch::channel(value).0);
            },
        }
    }

    /// Watch property `name`. A missing property is created with `null`.
    pub fn listen(&self, name: &str) -> watch::Receiver<JsonValue> {
        self.properties()
            .entry(name.to_string())
            .or_insert_with(|| watch::channel(JsonValue::Null).0)
            .subscribe()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(method_key(name))
    }

    /// Call method `name` without system context. Unknown methods return
    /// `null`.
    pub fn call(&self, name: &str, args: &[JsonValue]) -> JsonValue {
        self.call_in(None, name, args)
    }

    /// Call method `name` with access to the owning `system`.
    pub fn call_in(&self, system: Option<&MockSystem>, name: &str, args: &[JsonValue]) -> JsonValue {
        match self.methods.get(method_key(name)) {
            Some(method) => {
                let ctx = MockCallContext {
                    module: self,
                    system,
                };
                method(&ctx, args)
            },
            None => JsonValue::Null,
        }
    }
}

/// Builder for [`MockModule`].
#[derive(Default)]
pub struct MockModuleBuilder {
    properties: Vec<(String, JsonValue)>,
    methods: HashMap<String, MockMethod>,
}

impl MockModuleBuilder {
    pub fn property(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.properties.push((name.into(), value));
        self
    }

    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&MockCallContext<'_>, &[JsonValue]) -> JsonValue + Send + Sync + 'static,
    {
        self.methods
            .insert(method_key(name).to_string(), Arc::new(f));
        self
    }

    pub fn build(self) -> MockModule {
        let properties = self
            .properties
            .into_iter()
            .map(|(name, value)| (name, watch::channel(value).0))
            .collect();
        MockModule {
            properties: Mutex::new(properties),
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_and_set() {
        let module = MockModule::builder().property("volume", json!(10)).build();
        assert_eq!(module.get("volume"), Some(json!(10)));
        assert_eq!(module.get("missing"), None);

        module.set("volume", json!(20));
        module.set("mute", json!(true));
        assert_eq!(module.get("volume"), Some(json!(20)));
        assert_eq!(module.get("mute"), Some(json!(true)));
    }

    #[test]
    fn test_call_strips_prefix_and_defaults_to_null() {
        let module = MockModule::builder()
            .method("$add", |_, args| {
                json!(args.iter().filter_map(|a| a.as_i64()).sum::<i64>())
            })
            .build();
        assert!(module.has_method("add"));
        assert!(module.has_method("$add"));
        assert_eq!(module.call("add", &[json!(1), json!(2)]), json!(3));
        assert_eq!(module.call("$add", &[json!(4)]), json!(4));
        assert_eq!(module.call("subtract", &[]), JsonValue::Null);
    }

    #[tokio::test]
    async fn test_listen_creates_null_property_and_sees_sets() {
        let module = MockModule::builder().build();
        let mut rx = module.listen("power");
        assert_eq!(*rx.borrow_and_update(), JsonValue::Null);
        assert_eq!(module.get("power"), Some(JsonValue::Null));

        module.set("power", json!(true));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), json!(true));
    }

    #[test]
    fn test_method_can_mutate_own_properties() {
        let module = MockModule::builder()
            .property("count", json!(0))
            .method("increment", |ctx, _| {
                let next = ctx.module.get("count").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
                ctx.module.set("count", json!(next));
                json!(next)
            })
            .build();
        module.call("increment", &[]);
        assert_eq!(module.call("increment", &[]), json!(2));
        assert_eq!(module.get("count"), Some(json!(2)));
    }
}
