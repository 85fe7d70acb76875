use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::cassandra::{PluginError, Statements, UsernameConfig};

/// Operations a database credential plugin exposes to its host
#[async_trait]
pub trait Database: Send + Sync {
    /// Static identifier of the backend
    fn type_name(&self) -> &'static str;

    /// Validate and store configuration, optionally proving connectivity
    async fn initialize(
        &self,
        config: &Map<String, Value>,
        verify_connection: bool,
    ) -> Result<(), PluginError>;

    /// Create a user and return `(username, password)`
    async fn create_user(
        &self,
        statements: &Statements,
        username_config: &UsernameConfig,
        expiration: SystemTime,
    ) -> Result<(String, String), PluginError>;

    // Extend a user's lease
    async fn renew_user(
        &self,
        statements: &Statements,
        username: &str,
        expiration: SystemTime,
    ) -> Result<(), PluginError>;

    /// Remove a user, running every revocation statement
    async fn revoke_user(&self, statements: &Statements, username: &str)
        -> Result<(), PluginError>;

    /// Release the session; safe to call repeatedly
    async fn close(&self) -> Result<(), PluginError>;
}
