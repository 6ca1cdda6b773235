//! Socket plumbing: connect target resolution and the tungstenite connector.
//!
//! The transport never talks to tungstenite directly. It opens a
//! [`SocketSession`] through a [`SocketConnector`] and then only deals in
//! text frames, which lets the mock backend and tests stand in for the
//! network.

use crate::{
    auth::AuthProvider,
    event_handlers::{ConnectionError, DisconnectReason},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    http::{header::COOKIE, HeaderValue},
    protocol::Message,
};
use url::Url;

/// Where and how to open the realtime socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Full `ws://` or `wss://` URL including any query parameters
    pub url: String,
    /// Value of the `Cookie` header carrying the credentials, when they are
    /// not in the URL
    pub cookie: Option<String>,
}

impl ConnectTarget {
    /// Target used when every frame is served by the in-process mock backend.
    pub fn mock(auth: &dyn AuthProvider) -> Self {
        Self {
            url: format!("mock://{}{}", auth.host(), websocket_route(auth)),
            cookie: None,
        }
    }

    /// Resolve the socket target from the auth collaborator.
    ///
    /// Returns `None` while the authority or token is missing.
    pub fn from_auth(auth: &dyn AuthProvider) -> Option<Self> {
        auth.authority()?;
        let token = auth.current_token()?;

        let scheme = if auth.is_secure() { "wss" } else { "ws" };
        let mut url = Url::parse(&format!(
            "{}://{}{}",
            scheme,
            auth.host(),
            websocket_route(auth)
        ))
        .ok()?;

        if auth.is_fixed_device() {
            url.query_pairs_mut().append_pair("fixed_device", "true");
        }

        let (key, value) = if auth.token_is_api_key() {
            ("api-key", auth.api_key().unwrap_or_default())
        } else {
            ("bearer_token", token)
        };

        let cookie = if auth.needs_token_header() {
            url.query_pairs_mut().append_pair(key, &value);
            None
        } else {
            Some(format!("{}={}", key, value))
        };

        Some(Self {
            url: url.to_string(),
            cookie,
        })
    }
}

/// Path of the realtime endpoint.
///
/// Legacy `/control/` deployments expose `/control/websocket`; everything
/// else lives under `{http_route}/systems/control`.
pub fn websocket_route(auth: &dyn AuthProvider) -> String {
    let endpoint = format!("{}{}", auth.host(), auth.http_route());
    if endpoint.contains("/control/") {
        "/control/websocket".to_string()
    } else {
        format!("{}/systems/control", auth.http_route())
    }
}

/// Events produced by an open socket session.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// One inbound text frame
    Text(String),
    /// The peer closed the session
    Closed(Option<DisconnectReason>),
    /// The session failed
    Error(ConnectionError),
}

/// An open socket session: a writer for text frames and a stream of events.
///
/// Dropping `outbound` closes the session.
#[derive(Debug)]
pub struct SocketSession {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

impl SocketSession {
    /// Create both halves of a session: the session itself and the peer
    /// side (a receiver of outbound frames and a sender of events).
    pub fn pair() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<SocketEvent>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
            },
            out_rx,
            in_tx,
        )
    }
}

/// Opens socket sessions.
#[async_trait::async_trait]
pub trait SocketConnector: Send + Sync + 'static {
    async fn open(&self, target: &ConnectTarget) -> Result<SocketSession, ConnectionError>;
}

/// [`SocketConnector`] over a real WebSocket.
#[derive(Debug, Default, Clone)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn open(&self, target: &ConnectTarget) -> Result<SocketSession, ConnectionError> {
        log::debug!("[place-link] Creating websocket connection to {}", target.url);
        let mut request = target.url.as_str().into_client_request().map_err(|e| {
            ConnectionError::new(format!("Failed to build WebSocket request: {}", e), false)
        })?;

        if let Some(cookie) = &target.cookie {
            log::debug!("[place-link] Authenticating through cookie...");
            let value = HeaderValue::from_str(cookie).map_err(|e| {
                ConnectionError::new(format!("Invalid credentials for Cookie header: {}", e), false)
            })?;
            request.headers_mut().insert(COOKIE, value);
        } else {
            log::debug!("[place-link] Authenticating through URL query parameter...");
        }

        let ws_stream = match tokio_tungstenite::connect_async(request).await {
            Ok((stream, _)) => stream,
            Err(tokio_tungstenite::tungstenite::error::Error::Http(response)) => {
                let status = response.status().as_u16();
                let message = match status {
                    401 => "Unauthorized: WebSocket requires valid credentials".to_string(),
                    403 => "Forbidden: Access to WebSocket denied".to_string(),
                    code => format!("WebSocket HTTP error: {}", code),
                };
                return Err(ConnectionError::new(message, status != 403).with_status(status));
            },
            Err(e) => {
                return Err(ConnectionError::new(format!("Connection failed: {}", e), true));
            },
        };

        let (session, mut out_rx, in_tx) = SocketSession::pair();
        let (mut sink, mut stream) = ws_stream.split();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = out_rx.recv() => {
                        match outgoing {
                            Some(text) => {
                                if let Err(e) = sink.send(Message::Text(text.into())).await {
                                    let _ = in_tx.send(SocketEvent::Error(ConnectionError::new(
                                        format!("Failed to send frame: {}", e),
                                        true,
                                    )));
                                    break;
                                }
                            },
                            None => {
                                let _ = sink.close().await;
                                break;
                            },
                        }
                    }

                    frame = stream.next() => {
                        let event = match frame {
                            Some(Ok(Message::Text(text))) => SocketEvent::Text(text.as_str().to_string()),
                            Some(Ok(Message::Binary(data))) => {
                                match String::from_utf8(data.to_vec()) {
                                    Ok(text) => SocketEvent::Text(text),
                                    Err(_) => {
                                        log::warn!("[place-link] Dropping non UTF-8 binary frame");
                                        continue;
                                    },
                                }
                            },
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = sink.send(Message::Pong(payload)).await;
                                continue;
                            },
                            Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => continue,
                            Some(Ok(Message::Close(frame))) => {
                                let reason = frame.map(|f| {
                                    DisconnectReason::with_code(f.reason.to_string(), f.code.into())
                                });
                                let _ = in_tx.send(SocketEvent::Closed(reason));
                                break;
                            },
                            Some(Err(e)) => {
                                let _ = in_tx.send(SocketEvent::Error(ConnectionError::new(
                                    e.to_string(),
                                    true,
                                )));
                                break;
                            },
                            None => {
                                let _ = in_tx.send(SocketEvent::Closed(None));
                                break;
                            },
                        };
                        if in_tx.send(event).is_err() {
                            let _ = sink.close().await;
                            break;
                        }
                    }
                }
            }
        });

        Ok(session)
    }
}
