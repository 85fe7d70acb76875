//! Cassandra sessions backed by the scylla driver.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use scylla::client::execution_profile::ExecutionProfile;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::policies::load_balancing::DefaultPolicy;
use tracing::{debug, info, warn};

use crate::cassandra::{ConnectionConfig, Connector, CqlSession, PluginError};

/// Statement used to prove the configured user is authenticated and
/// authorized to manage users.
const VALIDATION_CQL: &str = "LIST ALL";

/// openssl's rendering of a server chain that does not lead to a trusted root.
const VERIFY_FAILED: &str = "certificate verify failed";

/// Wording hosts match on for an untrusted server certificate.
const UNKNOWN_AUTHORITY: &str = "x509: certificate signed by unknown authority";

/// Wraps a session failure, naming an untrusted server certificate explicitly.
fn connection_error(context: &str, err: impl fmt::Display) -> PluginError {
    let message = err.to_string();
    if message.contains(VERIFY_FAILED) {
        PluginError::Connection(format!("{}: {}: {}", context, UNKNOWN_AUTHORITY, message))
    } else {
        PluginError::Connection(format!("{}: {}", context, message))
    }
}

/// Opens real sessions against a Cassandra cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScyllaConnector;

#[async_trait]
impl Connector for ScyllaConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn CqlSession>, PluginError> {
        let points = config.contact_points();
        info!(contact_points = ?points, tls = config.tls, "connecting to cassandra");

        let mut builder = SessionBuilder::new()
            .known_nodes(&points)
            .user(config.username.as_str(), config.password());

        if let Some(timeout) = config.connect_timeout {
            builder = builder.connection_timeout(timeout);
        }
        if let Some(interval) = config.socket_keep_alive {
            builder = builder.tcp_keepalive_interval(interval);
        }
        if config.tls {
            let tls = config.client_tls_config()?;
            debug!(tls = ?tls, "enabling TLS for cassandra session");
            builder = builder.tls_context(Some(tls.into_context()));
        }

        let mut profile = ExecutionProfile::builder();
        if let Some(consistency) = config.consistency {
            profile = profile.consistency(consistency);
        }
        if let Some(dc) = &config.local_datacenter {
            let policy = DefaultPolicy::builder()
                .prefer_datacenter(dc.clone())
                .build();
            profile = profile.load_balancing_policy(policy);
        }
        builder = builder.default_execution_profile_handle(profile.build().into_handle());

        let session: Session = builder
            .build()
            .await
            .map_err(|e| connection_error("error creating session", e))?;

        if config.skip_verification {
            warn!("skipping connection validation");
        } else {
            session
                .query_unpaged(VALIDATION_CQL, ())
                .await
                .map_err(|e| connection_error("error validating connection info", e))?;
            debug!("cassandra connection validated");
        }

        Ok(Arc::new(ScyllaSession { session }))
    }
}

/// A driver session. Dropping it closes every pooled connection.
pub struct ScyllaSession {
    session: Session,
}

#[async_trait]
impl CqlSession for ScyllaSession {
    async fn execute(&self, statement: &str) -> Result<(), PluginError> {
        self.session
            .query_unpaged(statement, ())
            .await
            .map(|_| ())
            .map_err(|e| PluginError::Query(e.to_string()))
    }
}
