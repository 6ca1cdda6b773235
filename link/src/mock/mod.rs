//! Mock backend.
//!
//! Lets the whole client run without a PlaceOS server: systems are
//! registered in a [`MockRegistry`] and a [`MockConnector`] answers the
//! realtime protocol from them. Selected automatically when the auth
//! provider reports [`is_mock`](crate::AuthProvider::is_mock).

pub mod module;
pub mod server;
pub mod system;

pub use module::{MockCallContext, MockMethod, MockModule, MockModuleBuilder};
pub use server::MockConnector;
pub use system::{MockRegistry, MockSystem, MockSystemBuilder};
