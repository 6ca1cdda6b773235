//! Authentication collaborator for place-link.
//!
//! The realtime client never performs the OAuth handshake itself. It asks an
//! [`AuthProvider`] for the pieces it needs to open a socket (authority,
//! token or API key, host and route) and tells it when credentials went bad.

pub mod provider;

pub use provider::{ArcAuthProvider, AuthProvider, Authority, StaticAuthProvider, API_KEY_TOKEN};
