//! Owns the configuration and the single cached Cassandra session.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::cassandra::{ConnectionConfig, PluginError};

/// A live session able to run one CQL statement at a time.
#[async_trait]
pub trait CqlSession: Send + Sync {
    /// Runs `statement` unpaged with no bound values.
    async fn execute(&self, statement: &str) -> Result<(), PluginError>;
}

/// Builds sessions from validated configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens and validates a new session. Failures are `PluginError::Connection`
    /// (or `Config` for settings only detectable at connect time).
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn CqlSession>, PluginError>;
}

/// Holds configuration, derived TLS material and the lazily created session.
///
/// Every method takes `&mut self`; the plugin keeps the producer behind its
/// instance mutex, so the session state machine never interleaves.
pub struct ConnectionProducer {
    connector: Arc<dyn Connector>,
    config: Option<ConnectionConfig>,
    session: Option<Arc<dyn CqlSession>>,
    initialized: bool,
}

impl ConnectionProducer {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            config: None,
            session: None,
            initialized: false,
        }
    }

    /// Decodes `raw`, derives TLS material and marks the producer ready.
    ///
    /// Any session left over from an earlier configuration is dropped. With
    /// `verify_connection` a session is opened right away and its failure is
    /// returned.
    pub async fn initialize(
        &mut self,
        raw: &Map<String, Value>,
        verify_connection: bool,
    ) -> Result<(), PluginError> {
        let config = ConnectionConfig::from_map(raw)?;
        info!(
            hosts = config.hosts.len(),
            tls = config.tls,
            verify_connection,
            "initializing cassandra connection producer"
        );

        self.session = None;
        self.config = Some(config);
        self.initialized = true;

        if verify_connection {
            self.connection().await?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the cached session, creating it on first use.
    ///
    /// A failed build leaves the cache empty so the next call retries.
    pub async fn connection(&mut self) -> Result<Arc<dyn CqlSession>, PluginError> {
        if !self.initialized {
            return Err(PluginError::NotInitialized);
        }
        if let Some(session) = &self.session {
            return Ok(Arc::clone(session));
        }

        let config = self.config.as_ref().ok_or(PluginError::NotInitialized)?;
        debug!(hosts = ?config.hosts, "creating cassandra session");
        let session = self.connector.connect(config).await?;
        self.session = Some(Arc::clone(&session));
        info!("cassandra session established");
        Ok(session)
    }

    /// Drops the cached session and the configuration. Idempotent.
    ///
    /// Later calls to [`connection`](Self::connection) fail with
    /// `NotInitialized` until the producer is initialized again.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            info!("cassandra session closed");
        }
        self.config = None;
        self.initialized = false;
    }
}
