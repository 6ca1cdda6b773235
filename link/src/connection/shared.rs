//! Shared realtime connection.
//!
//! One socket session per [`Transport`], owned by a background task that:
//!
//! - Waits for credentials, giving up after a bounded number of attempts
//! - Sends `"ping"` on open and on every keepalive tick
//! - Drops sessions that stay silent (health check, 4x keepalive)
//! - Routes inbound frames to the request table, binding store and debug stream
//! - Reconnects with a linear, capped backoff
//! - Fires connection lifecycle events (`on_connect`, `on_disconnect`, `on_error`, `on_fatal`)

use crate::{
    auth::{ArcAuthProvider, AuthProvider},
    connection::{
        websocket::{ConnectTarget, SocketConnector, SocketEvent, SocketSession},
        FAR_FUTURE,
    },
    correlation::RequestTable,
    error::{PlaceLinkError, Result},
    event_handlers::{ConnectionError, DisconnectReason, EventHandlers},
    models::{
        ConnectionOptions, ConnectionState, DebugEvent, InboundFrame, LogLevel, ServerMessage,
        SessionSync,
    },
    store::BindingStore,
    timeouts::PlaceLinkTimeouts,
};
use serde_json::Value as JsonValue;
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;

/// Current time in millis since Unix epoch.
#[inline]
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public API to the background connection task.
enum ConnCmd {
    Shutdown,
}

/// Progress of the background connection task, observed by `connect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPhase {
    /// No task running
    Idle,
    /// Waiting for credentials, opening, or backing off before a reconnect
    Connecting,
    /// A session is open
    Connected,
    /// Credentials never became available; the task has stopped
    Fatal { attempts: u32 },
}

/// Outcome of one credential check.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AuthWait {
    Ready(ConnectTarget),
    Retry { attempt: u32, delay: Duration },
    Fatal { attempts: u32 },
}

/// Decide what the connection task does after `tries` unsuccessful
/// credential checks.
pub(crate) fn next_auth_step(
    auth: &dyn AuthProvider,
    tries: u32,
    options: &ConnectionOptions,
) -> AuthWait {
    if auth.is_mock() {
        return AuthWait::Ready(ConnectTarget::mock(auth));
    }
    if let Some(target) = ConnectTarget::from_auth(auth) {
        return AuthWait::Ready(target);
    }
    if tries >= options.max_auth_wait_attempts {
        return AuthWait::Fatal { attempts: tries };
    }
    let attempt = tries + 1;
    AuthWait::Retry {
        attempt,
        delay: options.auth_wait_delay(attempt),
    }
}

/// How a session (or an attempt at one) ended.
enum SessionEnd {
    Shutdown,
    Closed(DisconnectReason),
    Failed(ConnectionError),
}

// ── Shared state ────────────────────────────────────────────────────────────

struct TransportShared {
    auth: ArcAuthProvider,
    connector: Arc<dyn SocketConnector>,
    mock_connector: Arc<dyn SocketConnector>,
    timeouts: PlaceLinkTimeouts,
    options: ConnectionOptions,
    handlers: EventHandlers,
    table: RequestTable,
    store: Arc<BindingStore>,
    debug_tx: broadcast::Sender<DebugEvent>,
    status_tx: watch::Sender<bool>,
    sync_tx: watch::Sender<SessionSync>,
    phase_tx: watch::Sender<ConnectPhase>,
    state: Mutex<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl TransportShared {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn outbound(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
        self.outbound.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_connected(&self) -> bool {
        *self.status_tx.borrow()
    }

    fn set_status(&self, connected: bool) {
        self.status_tx.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    fn send(&self, raw: &str) -> Result<()> {
        let outbound = self.outbound();
        match outbound.as_ref() {
            Some(tx) if self.is_connected() => {
                tx.send(raw.to_string()).map_err(|_| {
                    PlaceLinkError::WebSocketError("Socket session is closed".to_string())
                })?;
                self.handlers.emit_send(raw);
                Ok(())
            },
            _ => Err(PlaceLinkError::WebSocketError("Not connected".to_string())),
        }
    }

    fn session_opened(&self, outbound: &mpsc::UnboundedSender<String>) {
        *self.outbound() = Some(outbound.clone());
        let connection_id = {
            let mut state = self.state();
            state.connected = true;
            state.connection_attempts = 0;
            state.connection_id += 1;
            state.connected_at_ms = Some(now_ms());
            state.connection_id
        };
        log::info!("[place-link] Connection established (session {})", connection_id);
        self.set_status(true);
        self.phase_tx.send_replace(ConnectPhase::Connected);
        self.handlers.emit_connect();
    }

    /// Tear down the current session. Pending requests fail, the status
    /// stream flips to `false` and the session length is published.
    fn session_lost(&self, reason: DisconnectReason) {
        self.outbound().take();
        let ended = {
            let mut state = self.state();
            let was_connected = state.connected;
            state.connected = false;
            let alive_ms = state
                .connected_at_ms
                .take()
                .map(|at| now_ms().saturating_sub(at))
                .unwrap_or_default();
            was_connected.then_some(SessionSync {
                connection_id: state.connection_id,
                alive_ms,
            })
        };
        self.set_status(false);
        self.table.clear();
        if let Some(sync) = ended {
            log::info!("[place-link] Connection closed: {}", reason);
            self.sync_tx.send_replace(sync);
            self.handlers.emit_disconnect(reason);
        }
    }

    async fn session_failed(&self, error: ConnectionError) {
        log::warn!("[place-link] Websocket error: {}", error);
        self.handlers.emit_error(error.clone());
        if error.status == Some(401) {
            self.auth.invalidate_token();
        }
        if let Err(e) = self.auth.refresh_authority().await {
            log::warn!("[place-link] Failed to refresh authority: {}", e);
        }
        self.session_lost(DisconnectReason::new(format!("WebSocket error: {}", error.message)));
    }

    fn shutdown(&self) {
        self.session_lost(DisconnectReason::new("Client disconnected"));
        self.phase_tx.send_replace(ConnectPhase::Idle);
    }

    fn route_frame(&self, text: &str) {
        match InboundFrame::parse(text) {
            InboundFrame::Pong => {
                self.state().last_pong_at_ms = Some(now_ms());
            },
            InboundFrame::Message(ServerMessage::Success { id, value }) => {
                log::debug!("[place-link] [SUCCESS]({})", id);
                self.table.resolve(id, value);
            },
            InboundFrame::Message(ServerMessage::Error { id, code, msg }) => {
                log::warn!("[place-link] [{}]({}) {}", code.label(), id, msg);
                self.table.reject(id, PlaceLinkError::protocol(code, msg));
            },
            InboundFrame::Message(ServerMessage::Notify { meta, value }) => {
                self.store.notify(&meta, value);
            },
            InboundFrame::Message(ServerMessage::Debug {
                mod_id,
                klass,
                msg,
                level,
                meta,
            }) => {
                log::debug!(
                    "[place-link] [DEBUG] {}{} -> {:?}",
                    mod_id.as_deref().unwrap_or_default(),
                    klass.as_deref().unwrap_or_default(),
                    msg
                );
                let meta = meta.unwrap_or_default();
                let index = match &meta.index {
                    JsonValue::String(index) => index.clone(),
                    JsonValue::Null => String::new(),
                    other => other.to_string(),
                };
                let event = DebugEvent {
                    mod_id: mod_id.unwrap_or_else(|| "<empty>".to_string()),
                    module: format!("{}_{}", meta.module, index),
                    class_name: klass.unwrap_or_else(|| "<empty>".to_string()),
                    message: msg.unwrap_or_else(|| "<empty>".to_string()),
                    level: level.unwrap_or(LogLevel::Debug),
                    time: now_ms() / 1000,
                };
                // No receivers is fine
                let _ = self.debug_tx.send(event);
            },
            InboundFrame::Command(command) => {
                log::trace!("[place-link] Ignoring echoed {} command", command.cmd);
            },
            InboundFrame::Unknown(value) => {
                log::warn!("[place-link] Invalid websocket message: {}", value);
            },
        }
    }
}

// ── Transport (public handle) ───────────────────────────────────────────────

struct TaskHandle {
    cmd_tx: mpsc::Sender<ConnCmd>,
    join: JoinHandle<()>,
}

/// Owner of the realtime socket.
///
/// Cheap to share behind an `Arc`; every method takes `&self`. The socket
/// is opened lazily by [`connect`](Self::connect) and kept open (and
/// reopened) by a background task until [`disconnect`](Self::disconnect).
pub struct Transport {
    shared: Arc<TransportShared>,
    task: Mutex<Option<TaskHandle>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.connection_state())
            .field("phase", &self.phase())
            .finish()
    }
}

impl Transport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        auth: ArcAuthProvider,
        connector: Arc<dyn SocketConnector>,
        mock_connector: Arc<dyn SocketConnector>,
        timeouts: PlaceLinkTimeouts,
        options: ConnectionOptions,
        handlers: EventHandlers,
        table: RequestTable,
        store: Arc<BindingStore>,
    ) -> Self {
        let (debug_tx, _) = broadcast::channel(options.event_channel_capacity.max(1));
        let (status_tx, _) = watch::channel(false);
        let (sync_tx, _) = watch::channel(SessionSync::default());
        let (phase_tx, _) = watch::channel(ConnectPhase::Idle);
        Self {
            shared: Arc::new(TransportShared {
                auth,
                connector,
                mock_connector,
                timeouts,
                options,
                handlers,
                table,
                store,
                debug_tx,
                status_tx,
                sync_tx,
                phase_tx,
                state: Mutex::new(ConnectionState::default()),
                outbound: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<TaskHandle>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start the background task unless one is already running.
    fn ensure_task(&self) {
        let mut task = self.task();
        if let Some(handle) = task.as_ref() {
            if !handle.join.is_finished() {
                return;
            }
        }
        let (cmd_tx, cmd_rx) = mpsc::channel::<ConnCmd>(8);
        self.shared.phase_tx.send_replace(ConnectPhase::Connecting);
        let shared = self.shared.clone();
        let join = tokio::spawn(async move {
            connection_task(shared, cmd_rx).await;
        });
        *task = Some(TaskHandle { cmd_tx, join });
    }

    /// Open the socket, or wait for the attempt already in progress.
    ///
    /// Resolves once a session is open. Fails with
    /// [`PlaceLinkError::ConnectExhausted`] when credentials never became
    /// available.
    pub async fn connect(&self) -> Result<()> {
        let mut phase_rx = self.shared.phase_tx.subscribe();
        self.ensure_task();
        loop {
            let phase = *phase_rx.borrow_and_update();
            match phase {
                ConnectPhase::Connected => return Ok(()),
                ConnectPhase::Fatal { attempts } => {
                    return Err(PlaceLinkError::ConnectExhausted { attempts })
                },
                ConnectPhase::Idle => {
                    return Err(PlaceLinkError::WebSocketError(
                        "Connection closed before it was established".to_string(),
                    ))
                },
                ConnectPhase::Connecting => {},
            }
            phase_rx.changed().await.map_err(|_| {
                PlaceLinkError::InternalError("Transport dropped while connecting".to_string())
            })?;
        }
    }

    /// `true` while a connect attempt (or reconnect backoff) is in progress.
    pub fn is_connecting(&self) -> bool {
        let running = self
            .task()
            .as_ref()
            .map_or(false, |handle| !handle.join.is_finished());
        running && self.phase() == ConnectPhase::Connecting
    }

    pub fn phase(&self) -> ConnectPhase {
        *self.shared.phase_tx.borrow()
    }

    /// Write one text frame on the current session.
    ///
    /// Nothing is queued: this fails immediately while disconnected.
    pub fn send(&self, raw: &str) -> Result<()> {
        self.shared.send(raw)
    }

    /// Close the session and stop the background task. No reconnect follows.
    pub async fn disconnect(&self) {
        let handle = self.task().take();
        if let Some(handle) = handle {
            let _ = handle.cmd_tx.send(ConnCmd::Shutdown).await;
            if let Err(e) = handle.join.await {
                log::warn!("[place-link] Connection task ended abnormally: {}", e);
            }
        }
        self.shared.shutdown();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Connection status stream. Replays the current status.
    pub fn status(&self) -> watch::Receiver<bool> {
        self.shared.status_tx.subscribe()
    }

    /// Session stream: `(connection_id, alive)` published each time a
    /// session ends.
    pub fn sync(&self) -> watch::Receiver<SessionSync> {
        self.shared.sync_tx.subscribe()
    }

    /// Module debug output received after a `debug` command.
    pub fn debug_events(&self) -> broadcast::Receiver<DebugEvent> {
        self.shared.debug_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state().clone()
    }

    pub fn auth(&self) -> &ArcAuthProvider {
        &self.shared.auth
    }

    pub fn timeouts(&self) -> &PlaceLinkTimeouts {
        &self.shared.timeouts
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(handle) = self.task().take() {
            let _ = handle.cmd_tx.try_send(ConnCmd::Shutdown);
        }
    }
}

// ── Background connection task ──────────────────────────────────────────────

/// Sleep for `delay`, returning `true` if a shutdown arrived meanwhile.
async fn sleep_or_shutdown(cmd_rx: &mut mpsc::Receiver<ConnCmd>, delay: Duration) -> bool {
    tokio::select! {
        biased;
        cmd = cmd_rx.recv() => matches!(cmd, Some(ConnCmd::Shutdown) | None),
        _ = tokio::time::sleep(delay) => false,
    }
}

async fn open_session(
    shared: &TransportShared,
    connector: &dyn SocketConnector,
    target: &ConnectTarget,
) -> std::result::Result<SocketSession, ConnectionError> {
    let connection_timeout = shared.timeouts.connection_timeout;
    if PlaceLinkTimeouts::is_no_timeout(connection_timeout) {
        return connector.open(target).await;
    }
    match tokio::time::timeout(connection_timeout, connector.open(target)).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::new(
            format!("Connection timeout ({:?})", connection_timeout),
            true,
        )),
    }
}

async fn run_session(
    shared: &TransportShared,
    mut session: SocketSession,
    cmd_rx: &mut mpsc::Receiver<ConnCmd>,
) -> SessionEnd {
    shared.session_opened(&session.outbound);

    let keepalive_dur = shared.timeouts.keepalive_interval;
    let has_keepalive = !keepalive_dur.is_zero();
    let silence_limit = shared.timeouts.silence_limit();
    let mut keepalive_deadline =
        TokioInstant::now() + if has_keepalive { keepalive_dur } else { FAR_FUTURE };

    let health_dur = shared.timeouts.health_check_timeout;
    let mut awaiting_first_frame = !health_dur.is_zero();
    let health_deadline =
        TokioInstant::now() + if awaiting_first_frame { health_dur } else { FAR_FUTURE };

    let mut last_activity = TokioInstant::now();
    if let Err(e) = shared.send("ping") {
        return SessionEnd::Failed(ConnectionError::new(e.to_string(), true));
    }

    loop {
        let keepalive_sleep = tokio::time::sleep_until(keepalive_deadline);
        tokio::pin!(keepalive_sleep);

        let health_sleep = tokio::time::sleep_until(health_deadline);
        tokio::pin!(health_sleep);

        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ConnCmd::Shutdown) | None => return SessionEnd::Shutdown,
                }
            }

            _ = &mut health_sleep, if awaiting_first_frame => {
                log::warn!("[place-link] Unhealthy connection. Reconnecting...");
                return SessionEnd::Closed(DisconnectReason::new(format!(
                    "No message within {:?} of connecting",
                    health_dur
                )));
            }

            _ = &mut keepalive_sleep, if has_keepalive => {
                if last_activity.elapsed() > silence_limit {
                    log::warn!(
                        "[place-link] No traffic for {:?}. Reconnecting...",
                        last_activity.elapsed()
                    );
                    return SessionEnd::Closed(DisconnectReason::new(format!(
                        "Server unresponsive for {:?}",
                        silence_limit
                    )));
                }
                if let Err(e) = shared.send("ping") {
                    return SessionEnd::Failed(ConnectionError::new(
                        format!("Keepalive ping failed: {}", e),
                        true,
                    ));
                }
                keepalive_deadline = TokioInstant::now() + keepalive_dur;
            }

            event = session.inbound.recv() => {
                match event {
                    Some(SocketEvent::Text(text)) => {
                        last_activity = TokioInstant::now();
                        awaiting_first_frame = false;
                        shared.handlers.emit_receive(&text);
                        shared.route_frame(&text);
                    },
                    Some(SocketEvent::Closed(reason)) => {
                        return SessionEnd::Closed(
                            reason.unwrap_or_else(|| DisconnectReason::new("Server closed connection")),
                        );
                    },
                    Some(SocketEvent::Error(error)) => return SessionEnd::Failed(error),
                    None => {
                        return SessionEnd::Closed(DisconnectReason::new("WebSocket stream ended"));
                    },
                }
            }
        }
    }
}

async fn connection_task(shared: Arc<TransportShared>, mut cmd_rx: mpsc::Receiver<ConnCmd>) {
    let mut auth_tries: u32 = 0;

    loop {
        let target = match next_auth_step(shared.auth.as_ref(), auth_tries, &shared.options) {
            AuthWait::Ready(target) => target,
            AuthWait::Retry { attempt, delay } => {
                log::info!(
                    "[place-link] Waiting on auth({}). Retrying in {}ms... [token: {}, authority: {}]",
                    attempt,
                    delay.as_millis(),
                    shared.auth.current_token().is_some(),
                    shared.auth.authority().is_some()
                );
                auth_tries = attempt;
                if sleep_or_shutdown(&mut cmd_rx, delay).await {
                    shared.shutdown();
                    return;
                }
                continue;
            },
            AuthWait::Fatal { attempts } => {
                log::error!(
                    "[place-link] Unable to obtain credentials after {} attempts",
                    attempts
                );
                if !shared.handlers.emit_fatal(attempts) {
                    log::error!("[place-link] No fatal handler registered; connection task stopped");
                }
                shared.phase_tx.send_replace(ConnectPhase::Fatal { attempts });
                return;
            },
        };
        auth_tries = 0;

        let connector = if shared.auth.is_mock() {
            shared.mock_connector.clone()
        } else {
            shared.connector.clone()
        };
        shared.state().connection_attempts += 1;
        log::debug!("[place-link] Connecting to {}", target.url);

        let opened = tokio::select! {
            biased;
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ConnCmd::Shutdown) | None => {
                        shared.shutdown();
                        return;
                    },
                }
            }
            result = open_session(&shared, connector.as_ref(), &target) => result,
        };

        let end = match opened {
            Ok(session) => run_session(&shared, session, &mut cmd_rx).await,
            Err(error) => SessionEnd::Failed(error),
        };

        match end {
            SessionEnd::Shutdown => {
                shared.shutdown();
                return;
            },
            SessionEnd::Closed(reason) => shared.session_lost(reason),
            SessionEnd::Failed(error) => shared.session_failed(error).await,
        }

        if !shared.options.auto_reconnect {
            log::info!("[place-link] Auto-reconnect disabled; connection task stopped");
            shared.phase_tx.send_replace(ConnectPhase::Idle);
            return;
        }

        let attempts = shared.state().connection_attempts;
        let delay = shared.options.reconnect_delay(attempts);
        shared.phase_tx.send_replace(ConnectPhase::Connecting);
        log::info!("[place-link] Reconnecting in {}ms...", delay.as_millis());
        if sleep_or_shutdown(&mut cmd_rx, delay).await {
            shared.shutdown();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Authority, StaticAuthProvider};

    #[test]
    fn test_auth_step_ready_with_credentials() {
        let auth = StaticAuthProvider::new("placeos.local")
            .with_token("tkn")
            .with_authority(Authority::default());
        let step = next_auth_step(&auth, 0, &ConnectionOptions::default());
        assert!(matches!(step, AuthWait::Ready(_)));
    }

    #[test]
    fn test_auth_step_mock_skips_credentials() {
        let auth = StaticAuthProvider::new("placeos.local").with_mock(true);
        let step = next_auth_step(&auth, 0, &ConnectionOptions::default());
        match step {
            AuthWait::Ready(target) => assert!(target.url.starts_with("mock://")),
            other => panic!("Expected ready, got {:?}", other),
        }
    }

    #[test]
    fn test_auth_step_retries_then_fatal() {
        let auth = StaticAuthProvider::new("placeos.local");
        let options = ConnectionOptions::default();

        assert_eq!(
            next_auth_step(&auth, 0, &options),
            AuthWait::Retry {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            next_auth_step(&auth, 20, &options),
            AuthWait::Retry {
                attempt: 21,
                delay: Duration::from_secs(10)
            }
        );
        assert_eq!(
            next_auth_step(&auth, 40, &options),
            AuthWait::Fatal { attempts: 40 }
        );
    }
}
