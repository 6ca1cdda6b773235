//! Main place-link client with builder pattern.
//!
//! Wires one [`Transport`], one [`RequestTable`] and one [`BindingStore`]
//! together and hands out system, module and status-variable handles on
//! top of them.

use crate::{
    auth::{ArcAuthProvider, AuthProvider},
    binding::{ModuleBinding, SystemBinding},
    connection::{websocket_route, SocketConnector, Transport, TungsteniteConnector},
    correlation::RequestTable,
    dispatcher::CommandDispatcher,
    error::{PlaceLinkError, Result},
    event_handlers::EventHandlers,
    mock::{MockConnector, MockRegistry, MockSystem},
    models::{ConnectionOptions, ConnectionState, DebugEvent, RequestAddress, SessionSync},
    store::{BindingStore, ValueListener},
    timeouts::PlaceLinkTimeouts,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Main realtime client.
///
/// Use [`PlaceLinkClientBuilder`] to construct instances. Clones share the
/// same socket, request table and binding store.
///
/// # Examples
///
/// ```rust,no_run
/// use place_link::{PlaceLinkClient, StaticAuthProvider};
///
/// # async fn example() -> place_link::Result<()> {
/// let client = PlaceLinkClient::builder()
///     .auth(StaticAuthProvider::new("building.example.com").with_token("token"))
///     .build()?;
///
/// let display = client.get_module("sys-A0", "Display_1")?;
/// let power = display.binding("power");
/// let guard = power.bind().await?;
/// println!("power: {:?}", power.value());
///
/// display.execute("power", vec![serde_json::json!(true)]).await?;
/// guard.release().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PlaceLinkClient {
    transport: Arc<Transport>,
    dispatcher: Arc<CommandDispatcher>,
    table: RequestTable,
    store: Arc<BindingStore>,
    registry: MockRegistry,
    timeouts: PlaceLinkTimeouts,
    systems: Arc<Mutex<HashMap<String, SystemBinding>>>,
}

impl std::fmt::Debug for PlaceLinkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaceLinkClient")
            .field("transport", &self.transport)
            .field("pending_requests", &self.table.len())
            .finish()
    }
}

impl PlaceLinkClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> PlaceLinkClientBuilder {
        PlaceLinkClientBuilder::new()
    }

    fn systems(&self) -> MutexGuard<'_, HashMap<String, SystemBinding>> {
        self.systems.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle for system `id`. Repeated calls return the same handle.
    pub fn get_system(&self, id: &str) -> SystemBinding {
        self.systems()
            .entry(id.to_string())
            .or_insert_with(|| {
                SystemBinding::new(
                    id,
                    self.dispatcher.clone(),
                    self.store.clone(),
                    self.timeouts.rebind_delay,
                )
            })
            .clone()
    }

    /// Handle for module `module_id` (`Class_index`) of system `sys`.
    pub fn get_module(&self, sys: &str, module_id: &str) -> Result<ModuleBinding> {
        self.get_system(sys).module(module_id)
    }

    /// Value stream for `address` (replays the latest value).
    pub fn listen(&self, address: &RequestAddress) -> ValueListener {
        self.store.listen(address)
    }

    /// Latest value received for `address`.
    pub fn value(&self, address: &RequestAddress) -> Option<JsonValue> {
        self.store.value(address)
    }

    /// Send a raw `bind`. Not reference counted; prefer
    /// [`VariableBinding::bind`](crate::VariableBinding::bind).
    pub async fn bind(&self, address: &RequestAddress) -> Result<JsonValue> {
        self.dispatcher.bind(address).await
    }

    pub async fn bind_with_timeout(
        &self,
        address: &RequestAddress,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        self.dispatcher.bind_with_timeout(address, timeout).await
    }

    /// Send a raw `unbind`.
    pub async fn unbind(&self, address: &RequestAddress) -> Result<JsonValue> {
        self.dispatcher.unbind(address).await
    }

    pub async fn unbind_with_timeout(
        &self,
        address: &RequestAddress,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        self.dispatcher.unbind_with_timeout(address, timeout).await
    }

    /// Execute method `address.name`, failing after the default request
    /// timeout.
    pub async fn execute(&self, address: &RequestAddress, args: Vec<JsonValue>) -> Result<JsonValue> {
        self.dispatcher.execute(address, args).await
    }

    pub async fn execute_with_timeout(
        &self,
        address: &RequestAddress,
        args: Vec<JsonValue>,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        self.dispatcher
            .execute_with_timeout(address, args, timeout)
            .await
    }

    pub async fn debug(&self, address: &RequestAddress) -> Result<JsonValue> {
        self.dispatcher.debug(address).await
    }

    pub async fn debug_with_timeout(
        &self,
        address: &RequestAddress,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        self.dispatcher.debug_with_timeout(address, timeout).await
    }

    pub async fn ignore(&self, address: &RequestAddress) -> Result<JsonValue> {
        self.dispatcher.ignore(address).await
    }

    pub async fn ignore_with_timeout(
        &self,
        address: &RequestAddress,
        timeout: Option<Duration>,
    ) -> Result<JsonValue> {
        self.dispatcher.ignore_with_timeout(address, timeout).await
    }

    /// Module debug output.
    pub fn debug_events(&self) -> broadcast::Receiver<DebugEvent> {
        self.transport.debug_events()
    }

    /// Connection status stream (replays the current status).
    pub fn status(&self) -> watch::Receiver<bool> {
        self.transport.status()
    }

    /// Published each time a session ends.
    pub fn sync(&self) -> watch::Receiver<SessionSync> {
        self.transport.sync()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.connection_state()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Route of the realtime endpoint for the configured auth provider.
    pub fn websocket_route(&self) -> String {
        websocket_route(self.transport.auth().as_ref())
    }

    pub fn auth(&self) -> &ArcAuthProvider {
        self.transport.auth()
    }

    /// Get the configured timeouts
    pub fn timeouts(&self) -> &PlaceLinkTimeouts {
        &self.timeouts
    }

    /// Open the socket now instead of on the first command.
    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await
    }

    /// Close the socket. Pending requests fail with
    /// [`PlaceLinkError::ConnectionLost`]; a later command reconnects.
    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    /// Register a system served by the mock backend.
    pub fn register_system(&self, id: impl Into<String>, system: MockSystem) -> Arc<MockSystem> {
        self.registry.register_system(id, system)
    }

    pub fn deregister_system(&self, id: &str) -> Option<Arc<MockSystem>> {
        self.registry.deregister_system(id)
    }

    pub fn mock_system(&self, id: &str) -> Option<Arc<MockSystem>> {
        self.registry.mock_system(id)
    }

    pub fn mock_registry(&self) -> &MockRegistry {
        &self.registry
    }

    /// Disconnect and drop every pending request, stored value and cached
    /// handle.
    pub async fn reset(&self) {
        self.transport.disconnect().await;
        self.table.clear();
        self.store.reset();
        let systems: Vec<SystemBinding> = self.systems().drain().map(|(_, s)| s).collect();
        for system in systems {
            system.clear_modules();
        }
        log::debug!("[place-link] Client reset");
    }
}

/// Builder for configuring [`PlaceLinkClient`] instances.
pub struct PlaceLinkClientBuilder {
    auth: Option<ArcAuthProvider>,
    timeouts: PlaceLinkTimeouts,
    connection_options: ConnectionOptions,
    event_handlers: EventHandlers,
    registry: MockRegistry,
    connector: Option<Arc<dyn SocketConnector>>,
}

impl PlaceLinkClientBuilder {
    fn new() -> Self {
        Self {
            auth: None,
            timeouts: PlaceLinkTimeouts::default(),
            connection_options: ConnectionOptions::default(),
            event_handlers: EventHandlers::default(),
            registry: MockRegistry::new(),
            connector: None,
        }
    }

    /// Set the auth provider that supplies host, token and authority
    pub fn auth(mut self, auth: impl AuthProvider) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Set an already shared auth provider
    pub fn auth_arc(mut self, auth: ArcAuthProvider) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set timeout configuration
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use place_link::{PlaceLinkClient, PlaceLinkTimeouts, StaticAuthProvider};
    ///
    /// # fn example() -> place_link::Result<()> {
    /// let client = PlaceLinkClient::builder()
    ///     .auth(StaticAuthProvider::mock())
    ///     .timeouts(PlaceLinkTimeouts::fast())
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn timeouts(mut self, timeouts: PlaceLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set reconnect and auth-wait behaviour
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Share a mock registry (e.g. between clients in tests)
    pub fn mock_registry(mut self, registry: MockRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the WebSocket connector used for real (non-mock) sessions
    pub fn connector(mut self, connector: impl SocketConnector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Build the client
    pub fn build(self) -> Result<PlaceLinkClient> {
        let auth = self
            .auth
            .ok_or_else(|| PlaceLinkError::ConfigurationError("auth provider is required".into()))?;

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TungsteniteConnector));
        let mock_connector: Arc<dyn SocketConnector> =
            Arc::new(MockConnector::new(self.registry.clone()));

        let table = RequestTable::new();
        let store = Arc::new(BindingStore::new());
        let transport = Arc::new(Transport::new(
            auth,
            connector,
            mock_connector,
            self.timeouts.clone(),
            self.connection_options,
            self.event_handlers,
            table.clone(),
            store.clone(),
        ));
        let dispatcher = Arc::new(CommandDispatcher::new(transport.clone(), table.clone(), &self.timeouts));

        Ok(PlaceLinkClient {
            transport,
            dispatcher,
            table,
            store,
            registry: self.registry,
            timeouts: self.timeouts,
            systems: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthProvider;

    #[test]
    fn test_builder_requires_auth() {
        let result = PlaceLinkClient::builder().build();
        assert!(matches!(result, Err(PlaceLinkError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_handles_are_cached() {
        let client = PlaceLinkClient::builder()
            .auth(StaticAuthProvider::mock())
            .build()
            .unwrap();
        client.register_system(
            "sys-A0",
            MockSystem::builder()
                .module(
                    "Test",
                    crate::mock::MockModule::builder()
                        .property("power", serde_json::json!(true))
                        .build(),
                )
                .build(),
        );

        let module = client.get_module("sys-A0", "Test").unwrap();
        assert_eq!(module.id(), "Test_1");
        assert_eq!(module.name(), "Test");
        assert_eq!(module.index(), 1);
        assert_eq!(client.get_system("sys-A0").id(), "sys-A0");

        let a = module.binding("power");
        let b = client.get_module("sys-A0", "Test_1").unwrap().binding("power");
        let guard = a.bind().await.unwrap();
        assert_eq!(b.count(), 1);
        guard.release().await.unwrap();
        assert_eq!(b.count(), 0);
        assert!(client.get_module("sys-A0", "_1").is_err());
    }

    #[test]
    fn test_websocket_route() {
        let client = PlaceLinkClient::builder()
            .auth(StaticAuthProvider::new("example.com").with_http_route("/api/engine/v2"))
            .build()
            .unwrap();
        assert_eq!(client.websocket_route(), "/api/engine/v2/systems/control");
        assert!(!client.is_connected());
    }
}
