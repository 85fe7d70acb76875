//! cassandra-dbplugin - dynamic Cassandra credential plugin
//!
//! This crate creates short-lived Cassandra users on behalf of a
//! secrets-management host and revokes them when their lease ends.
//!
//! ## Architecture
//!
//! The crate follows a layered architecture with the following dependencies:
//!
//! - `server` module - host adapter (can only access the `Database` interface)
//! - `plugin` module - request orchestration under the instance lock
//! - `cassandra` module - configuration, TLS, credentials and the driver session
//! - `cli` module - command-line flags for the plugin binary
//!
//! The cassandra module's building blocks are reached through the plugin;
//! the types a host or test needs are re-exported here.

pub mod cli;

// Interface module is available to all other modules
pub mod interface;

pub mod cassandra;
pub mod plugin;

// Server module is public for the binary but should only use the interface
pub mod server;

// Re-export public types for convenience
pub use cassandra::{PluginError, Statements, UsernameConfig};
pub use interface::Database;
pub use plugin::{CassandraPlugin, PLUGIN_TYPE};

/// Initialize logging for tests
#[allow(dead_code)]
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer() // This ensures output goes to both stdout and test output
        .try_init();
}
