//! # place-link
//!
//! Realtime binding client for the PlaceOS building-automation API.
//!
//! All traffic to the realtime endpoint goes over one shared WebSocket.
//! Callers bind to status variables of driver modules, receive their
//! values as they change, and execute module methods.
//!
//! ## Architecture
//!
//! ```text
//! PlaceLinkClient ── SystemBinding ── ModuleBinding ── VariableBinding
//!        │                                                  │
//!        └──────────── CommandDispatcher ◄──────────────────┘
//!                        │          │
//!                 RequestTable   Transport ── SocketConnector (tungstenite | mock)
//!                                   │
//!                              BindingStore (notify values)
//! ```
//!
//! - Identical in-flight requests are sent once and share one result
//! - Status bindings are reference counted and restored after a reconnect
//! - The mock backend serves registered systems in-process when the auth
//!   provider is in mock mode

pub mod auth;
pub mod binding;
pub mod client;
pub mod connection;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod event_handlers;
pub mod mock;
pub mod models;
pub mod store;
pub mod timeouts;

pub use auth::{ArcAuthProvider, AuthProvider, Authority, StaticAuthProvider, API_KEY_TOKEN};
pub use binding::{
    BindingCounts, BindingGuard, ModuleBinding, PendingOp, SystemBinding, VariableBinding,
};
pub use client::{PlaceLinkClient, PlaceLinkClientBuilder};
pub use connection::{
    ConnectPhase, ConnectTarget, SocketConnector, SocketEvent, SocketSession, Transport,
    TungsteniteConnector,
};
pub use correlation::RequestTable;
pub use dispatcher::CommandDispatcher;
pub use error::{PlaceLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use mock::{MockCallContext, MockConnector, MockModule, MockRegistry, MockSystem};
pub use models::{
    CommandKind, CommandRequest, ConnectionOptions, ConnectionState, DebugEvent, ErrorCode,
    InboundFrame, LogLevel, RequestAddress, ServerMessage, SessionSync,
};
pub use store::{BindingStore, ValueListener};
pub use timeouts::{PlaceLinkTimeouts, PlaceLinkTimeoutsBuilder};
