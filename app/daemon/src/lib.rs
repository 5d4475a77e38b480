//! The courier daemon — accepts line-oriented commands from local clients
//! over a stream socket and fans pushes out through the registered gateway
//! connectors.

pub mod config;
mod dispatcher;
mod net;
pub mod server;

pub use config::{Config, DEFAULT_DISPATCHERS, ListenConfig};
pub use server::{Server, init_database};
