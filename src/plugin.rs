//! The Cassandra credential plugin.
//!
//! Every operation takes the instance mutex before touching state, so at
//! most one database operation is outstanding per plugin instance and the
//! rollback sequence of a failed creation always observes a single session.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::cassandra::statements::{render, split_statements};
use crate::cassandra::{
    ConnectionProducer, Connector, CredentialsProducer, PluginError, ScyllaConnector, Statements,
    UsernameConfig,
};
use crate::interface::Database;

/// Identifier reported by [`Database::type_name`].
pub const PLUGIN_TYPE: &str = "cassandra";

pub struct CassandraPlugin {
    state: Mutex<ConnectionProducer>,
    credentials: CredentialsProducer,
}

impl Default for CassandraPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl CassandraPlugin {
    /// A plugin that connects through the scylla driver.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(ScyllaConnector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            state: Mutex::new(ConnectionProducer::new(connector)),
            credentials: CredentialsProducer::new(),
        }
    }
}

#[async_trait]
impl Database for CassandraPlugin {
    fn type_name(&self) -> &'static str {
        PLUGIN_TYPE
    }

    async fn initialize(
        &self,
        config: &Map<String, Value>,
        verify_connection: bool,
    ) -> Result<(), PluginError> {
        let mut state = self.state.lock().await;
        state.initialize(config, verify_connection).await
    }

    #[instrument(skip_all, fields(role = %username_config.role_name))]
    async fn create_user(
        &self,
        statements: &Statements,
        username_config: &UsernameConfig,
        expiration: SystemTime,
    ) -> Result<(String, String), PluginError> {
        let mut state = self.state.lock().await;
        let session = state.connection().await?;

        let creation = statements.creation();
        let rollback = statements.rollback();

        let username = self
            .credentials
            .generate_username(username_config)?
            .replace('-', "_")
            .to_lowercase();
        let password = self.credentials.generate_password()?;
        let valid_until = self.credentials.generate_expiration(expiration);
        debug!(valid_until = %valid_until, "cassandra users carry no expiry");

        let vars = [("username", username.as_str()), ("password", password.as_str())];
        for stmt in split_statements(creation) {
            if let Err(err) = session.execute(&render(stmt, &vars)).await {
                warn!(username = %username, error = %err, "creation failed, rolling back");
                for undo in split_statements(rollback) {
                    let undo = render(undo, &[("username", username.as_str())]);
                    if let Err(rollback_err) = session.execute(&undo).await {
                        debug!(error = %rollback_err, "rollback statement failed");
                    }
                }
                return Err(err);
            }
        }

        info!(username = %username, "created cassandra user");
        Ok((username, password))
    }

    async fn renew_user(
        &self,
        _statements: &Statements,
        username: &str,
        _expiration: SystemTime,
    ) -> Result<(), PluginError> {
        let _state = self.state.lock().await;
        debug!(username, "renew is a no-op for cassandra");
        Ok(())
    }

    #[instrument(skip(self, statements))]
    async fn revoke_user(&self, statements: &Statements, username: &str) -> Result<(), PluginError> {
        let mut state = self.state.lock().await;
        let session = state.connection().await?;

        let mut errors = Vec::new();
        for stmt in split_statements(statements.revocation()) {
            if let Err(err) = session.execute(&render(stmt, &[("username", username)])).await {
                warn!(error = %err, "revocation statement failed");
                errors.push(err);
            }
        }

        if errors.is_empty() {
            info!("revoked cassandra user");
        }
        PluginError::from_many(errors)
    }

    async fn close(&self) -> Result<(), PluginError> {
        let mut state = self.state.lock().await;
        state.close();
        Ok(())
    }
}
