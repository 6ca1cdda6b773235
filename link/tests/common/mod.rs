#![allow(dead_code)]
//! Shared helpers for place-link integration tests.
//!
//! [`ScriptedConnector`] stands in for the realtime server: tests read the
//! frames the client writes and push back whatever the server would send.

use place_link::{
    CommandRequest, ConnectTarget, ConnectionError, ConnectionOptions, PlaceLinkClient,
    PlaceLinkTimeouts, SocketConnector, SocketEvent, SocketSession, StaticAuthProvider,
};
use serde_json::{json, Value as JsonValue};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const HOST: &str = "placeos.test";
pub const TOKEN: &str = "test-token";

/// How long a test waits for a frame it expects.
pub const FRAME_WAIT: Duration = Duration::from_secs(2);

struct ScriptState {
    current: Mutex<Option<mpsc::UnboundedSender<SocketEvent>>>,
    failures: Mutex<VecDeque<ConnectionError>>,
    targets: Mutex<Vec<ConnectTarget>>,
    opens: AtomicU32,
    frames_tx: mpsc::UnboundedSender<String>,
    frames_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

/// In-memory [`SocketConnector`] driven by the test.
#[derive(Clone)]
pub struct ScriptedConnector {
    state: Arc<ScriptState>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(ScriptState {
                current: Mutex::new(None),
                failures: Mutex::new(VecDeque::new()),
                targets: Mutex::new(Vec::new()),
                opens: AtomicU32::new(0),
                frames_tx,
                frames_rx: tokio::sync::Mutex::new(frames_rx),
            }),
        }
    }

    /// Number of sessions opened so far.
    pub fn opens(&self) -> u32 {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn targets(&self) -> Vec<ConnectTarget> {
        self.state.targets.lock().unwrap().clone()
    }

    /// Make the next `open` fail with `error`.
    pub fn fail_next_open(&self, error: ConnectionError) {
        self.state.failures.lock().unwrap().push_back(error);
    }

    fn emit(&self, event: SocketEvent) {
        let current = self.state.current.lock().unwrap();
        let tx = current.as_ref().expect("no open session");
        tx.send(event).expect("session already closed");
    }

    /// Deliver a raw text frame to the client.
    pub fn push(&self, text: impl Into<String>) {
        self.emit(SocketEvent::Text(text.into()));
    }

    pub fn push_json(&self, value: JsonValue) {
        self.push(value.to_string());
    }

    pub fn respond_success(&self, id: u64, value: JsonValue) {
        self.push_json(json!({ "id": id, "type": "success", "value": value }));
    }

    pub fn respond_error(&self, id: u64, code: i64, msg: &str) {
        self.push_json(json!({ "id": id, "type": "error", "code": code, "msg": msg }));
    }

    pub fn notify(&self, sys: &str, module: &str, index: u32, name: &str, value: JsonValue) {
        self.push_json(json!({
            "type": "notify",
            "value": value,
            "meta": { "sys": sys, "mod": module, "index": index, "name": name },
        }));
    }

    /// Server-side close of the current session.
    pub fn close(&self) {
        self.emit(SocketEvent::Closed(None));
    }

    /// Socket error on the current session.
    pub fn fail(&self, error: ConnectionError) {
        self.emit(SocketEvent::Error(error));
    }

    /// Next frame written by the client, heartbeats included.
    pub async fn next_frame(&self) -> String {
        let mut rx = self.state.frames_rx.lock().await;
        tokio::time::timeout(FRAME_WAIT, rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("frame channel closed")
    }

    /// Next command written by the client, skipping heartbeats.
    pub async fn next_command(&self) -> CommandRequest {
        loop {
            let frame = self.next_frame().await;
            if frame == "ping" {
                continue;
            }
            return serde_json::from_str(&frame).expect("client wrote an invalid command");
        }
    }

    /// Assert the client writes no command within `wait`.
    pub async fn expect_no_command(&self, wait: Duration) {
        let mut rx = self.state.frames_rx.lock().await;
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => return,
                Ok(Some(frame)) if frame == "ping" => continue,
                Ok(Some(frame)) => panic!("unexpected command: {}", frame),
                Ok(None) => return,
            }
        }
    }
}

#[async_trait::async_trait]
impl SocketConnector for ScriptedConnector {
    async fn open(&self, target: &ConnectTarget) -> Result<SocketSession, ConnectionError> {
        self.state.targets.lock().unwrap().push(target.clone());
        if let Some(error) = self.state.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let (session, mut out_rx, in_tx) = SocketSession::pair();
        *self.state.current.lock().unwrap() = Some(in_tx);
        self.state.opens.fetch_add(1, Ordering::SeqCst);

        let frames_tx = self.state.frames_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let _ = frames_tx.send(frame);
            }
        });
        Ok(session)
    }
}

/// Timers short enough for tests; heartbeat and health check disabled.
pub fn test_timeouts() -> PlaceLinkTimeouts {
    PlaceLinkTimeouts::builder()
        .connection_timeout(Duration::from_secs(2))
        .keepalive_interval(Duration::ZERO)
        .health_check_timeout(Duration::ZERO)
        .request_timeout(Duration::from_secs(5))
        .send_retry_interval(Duration::from_millis(20))
        .rebind_delay(Duration::from_millis(10))
        .build()
}

pub fn test_options() -> ConnectionOptions {
    ConnectionOptions::new()
        .with_reconnect_delay_ms(20)
        .with_max_reconnect_delay_ms(100)
}

pub fn test_auth() -> StaticAuthProvider {
    StaticAuthProvider::new(HOST)
        .with_token(TOKEN)
        .with_authority(place_link::Authority::default())
}

/// Route library logs to the test output (`RUST_LOG=debug`).
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// Client wired to a fresh [`ScriptedConnector`].
pub fn scripted_client() -> (PlaceLinkClient, ScriptedConnector) {
    init_logging();
    let connector = ScriptedConnector::new();
    let client = PlaceLinkClient::builder()
        .auth(test_auth())
        .timeouts(test_timeouts())
        .connection_options(test_options())
        .connector(connector.clone())
        .build()
        .expect("client should build");
    (client, connector)
}

/// Answer the next command with `success` and return it.
pub async fn ack_next(connector: &ScriptedConnector) -> CommandRequest {
    let command = connector.next_command().await;
    connector.respond_success(command.id, JsonValue::Null);
    command
}
