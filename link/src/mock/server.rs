//! In-process server answering the realtime protocol from a [`MockRegistry`].

use super::system::MockRegistry;
use crate::{
    connection::websocket::{ConnectTarget, SocketConnector, SocketEvent, SocketSession},
    event_handlers::ConnectionError,
    models::{CommandKind, CommandRequest, ErrorCode, ServerMessage},
};
use rand::Rng;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Delay before a command is answered.
const RESPONSE_DELAY: Duration = Duration::from_millis(10);

/// Range of the delay (in ms) before a property change is pushed as `notify`.
const NOTIFY_DELAY_MS: std::ops::Range<u64> = 50..151;

/// [`SocketConnector`] that serves every session from a [`MockRegistry`].
///
/// - `"ping"` is answered with `"pong"`
/// - `bind` pushes the property's current value and every later change as
///   `notify` frames, each after a random 50-150 ms delay
/// - `unbind` stops those notifications
/// - `exec` calls the module method and answers with its return value
/// - commands for an unknown system or module are answered with the
///   matching not-found error
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    registry: MockRegistry,
}

impl MockConnector {
    pub fn new(registry: MockRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MockRegistry {
        &self.registry
    }
}

#[async_trait::async_trait]
impl SocketConnector for MockConnector {
    async fn open(&self, target: &ConnectTarget) -> Result<SocketSession, ConnectionError> {
        log::debug!("[place-link] Opening mock session for {}", target.url);
        let (session, out_rx, in_tx) = SocketSession::pair();
        tokio::spawn(serve(self.registry.clone(), out_rx, in_tx));
        Ok(session)
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(e) => {
            log::warn!("[place-link] Failed to encode mock frame: {}", e);
            None
        },
    }
}

fn reply_later(in_tx: &mpsc::UnboundedSender<SocketEvent>, message: ServerMessage) {
    let in_tx = in_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(RESPONSE_DELAY).await;
        if let Some(text) = encode(&message) {
            let _ = in_tx.send(SocketEvent::Text(text));
        }
    });
}

async fn serve(
    registry: MockRegistry,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    in_tx: mpsc::UnboundedSender<SocketEvent>,
) {
    let mut listeners: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(text) = out_rx.recv().await {
        if text == "ping" {
            let _ = in_tx.send(SocketEvent::Text("pong".to_string()));
            continue;
        }

        let request: CommandRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("[place-link] Mock backend ignoring frame {}: {}", text, e);
                continue;
            },
        };

        let system = registry.mock_system(&request.address.sys);
        let module = system
            .as_ref()
            .and_then(|s| s.module(&request.address.module, request.address.index));

        let module = match module {
            Some(module) => module,
            None => {
                let (code, msg) = if system.is_none() {
                    (
                        ErrorCode::SystemNotFound,
                        format!("System {} not found", request.address.sys),
                    )
                } else {
                    (
                        ErrorCode::ModuleNotFound,
                        format!("Module {} not found", request.address.module_id()),
                    )
                };
                reply_later(&in_tx, ServerMessage::Error {
                    id: request.id,
                    code,
                    msg,
                });
                continue;
            },
        };

        let key = request.address.to_string();
        let value = match request.cmd {
            CommandKind::Bind => {
                let mut rx = module.listen(&request.address.name);
                let in_tx = in_tx.clone();
                let meta = request.address.clone();
                let forwarder = tokio::spawn(async move {
                    loop {
                        let value = rx.borrow_and_update().clone();
                        let delay = rand::rng().random_range(NOTIFY_DELAY_MS);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        let notify = ServerMessage::Notify {
                            meta: meta.clone(),
                            value,
                        };
                        if let Some(text) = encode(&notify) {
                            if in_tx.send(SocketEvent::Text(text)).is_err() {
                                return;
                            }
                        }
                        if rx.changed().await.is_err() {
                            return;
                        }
                    }
                });
                if let Some(previous) = listeners.insert(key, forwarder) {
                    previous.abort();
                }
                JsonValue::Null
            },
            CommandKind::Unbind => {
                if let Some(forwarder) = listeners.remove(&key) {
                    forwarder.abort();
                }
                JsonValue::Null
            },
            CommandKind::Exec => module.call_in(
                system.as_deref(),
                &request.address.name,
                request.args.as_deref().unwrap_or_default(),
            ),
            CommandKind::Debug | CommandKind::Ignore => JsonValue::Null,
        };

        reply_later(&in_tx, ServerMessage::Success {
            id: request.id,
            value,
        });
    }

    for (_, forwarder) in listeners.drain() {
        forwarder.abort();
    }
    log::debug!("[place-link] Mock session closed");
}
