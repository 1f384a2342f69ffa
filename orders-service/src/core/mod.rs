//! Core - configuration, shared state and service bootstrap
//!
//! - [`Config`] - environment configuration
//! - [`AppState`] - HTTP API state
//! - [`Server`] - wires store, cache, broker, consumer and HTTP API

pub mod config;
pub mod server;
pub mod state;

pub use config::Config;
pub use server::Server;
pub use state::AppState;
