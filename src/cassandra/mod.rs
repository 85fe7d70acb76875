//! Cassandra module for the dynamic credential plugin
//!
//! This module implements the pieces the plugin is assembled from: typed
//! configuration, TLS material handling, credential generation, statement
//! templating and the lazily created driver session.
//!
//! ## Architectural role:
//! - `config` and `tls` turn the host's untyped map into validated settings
//! - `connection` owns the session state machine behind the `Connector` seam
//! - `session` is the only place that touches the scylla driver
//! - `credentials` and `statements` are pure and need no connection
//!
//! ## Testing strategy:
//! - Each module contains its own unit tests within a `#[cfg(test)] mod tests` block
//! - `test_utils.rs` provides an in-memory connector and runtime-issued certificates
//! - Tests against a real cluster live in the `tests/` directory

pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod session;
pub mod statements;
#[cfg(test)]
pub mod test_utils;
pub mod tls;

// Re-export key types and traits for convenience
pub use config::ConnectionConfig;
pub use connection::{ConnectionProducer, Connector, CqlSession};
pub use credentials::{CredentialsProducer, UsernameConfig};
pub use error::PluginError;
pub use session::ScyllaConnector;
pub use statements::Statements;
pub use tls::{TlsMaterial, TlsMinVersion};
