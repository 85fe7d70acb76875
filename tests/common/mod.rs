//! Common test fixtures for Cassandra integration tests.
//!
//! This module starts a Cassandra container with password authentication
//! enabled (superuser `cassandra`/`cassandra`) using Testcontainers 0.23.
//! The tests only run when the environment variable
//! `CASSANDRA_PLUGIN_RUN_INTEGRATION_TESTS` is set; otherwise they are skipped.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use serde_json::{json, Map, Value};
use testcontainers::core::IntoContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio::time::sleep;
use tracing::{debug, info};

pub const ADMIN_USER: &str = "cassandra";
pub const ADMIN_PASSWORD: &str = "cassandra";

pub fn integration_enabled() -> bool {
    let enabled = std::env::var("CASSANDRA_PLUGIN_RUN_INTEGRATION_TESTS").is_ok();
    if !enabled {
        eprintln!("skipping: CASSANDRA_PLUGIN_RUN_INTEGRATION_TESTS is not set");
    }
    enabled
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

pub struct CassandraFixture {
    container: ContainerAsync<GenericImage>,
    host: String,
    port: u16,
}

impl CassandraFixture {
    pub async fn new() -> Self {
        init_logging();
        let container = GenericImage::new("bitnami/cassandra", "4.1")
            .with_exposed_port(9042.tcp())
            .with_env_var("CASSANDRA_USER", ADMIN_USER)
            .with_env_var("CASSANDRA_PASSWORD", ADMIN_PASSWORD)
            .with_env_var("CASSANDRA_AUTHENTICATOR", "PasswordAuthenticator")
            .with_env_var("CASSANDRA_AUTHORIZER", "CassandraAuthorizer")
            .start()
            .await
            .expect("Failed to start Cassandra container");

        let host = container.get_host().await.unwrap().to_string();
        let port = container.get_host_port_ipv4(9042).await.unwrap();
        let fixture = CassandraFixture {
            container,
            host,
            port,
        };

        fixture
            .wait_until_ready(Duration::from_secs(240))
            .await
            .expect("Cassandra did not become ready");
        fixture
    }

    pub fn contact_point(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configuration map for `initialize` pointing at this container.
    pub fn config(&self) -> Map<String, Value> {
        let value = json!({
            "hosts": self.host,
            "port": self.port.to_string(),
            "username": ADMIN_USER,
            "password": ADMIN_PASSWORD,
            "protocol_version": "4",
            "connect_timeout": "20s",
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, String> {
        SessionBuilder::new()
            .known_node(self.contact_point())
            .user(username, password)
            .connection_timeout(Duration::from_secs(5))
            .build()
            .await
            .map_err(|e| e.to_string())
    }

    async fn wait_until_ready(&self, limit: Duration) -> Result<(), String> {
        let started = Instant::now();
        info!("Waiting for Cassandra at {}", self.contact_point());
        loop {
            match self.login(ADMIN_USER, ADMIN_PASSWORD).await {
                Ok(session) => match session.query_unpaged("LIST ALL", ()).await {
                    Ok(_) => {
                        info!("Cassandra ready after {:?}", started.elapsed());
                        return Ok(());
                    }
                    Err(e) => debug!("Cassandra not ready yet: {}", e),
                },
                Err(e) => debug!("Cassandra not ready yet: {}", e),
            }
            if started.elapsed() > limit {
                return Err(format!("Cassandra not ready after {:?}", limit));
            }
            sleep(Duration::from_secs(2)).await;
        }
    }

    /// Polls until `username` can log in, for at most `limit`.
    pub async fn can_login_within(&self, username: &str, password: &str, limit: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < limit {
            if self.login(username, password).await.is_ok() {
                return true;
            }
            sleep(Duration::from_millis(250)).await;
        }
        false
    }

    /// Polls until `username` is refused, for at most `limit`.
    pub async fn login_refused_within(&self, username: &str, password: &str, limit: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < limit {
            if self.login(username, password).await.is_err() {
                return true;
            }
            sleep(Duration::from_millis(250)).await;
        }
        false
    }

    /// Every role name known to the cluster.
    pub async fn roles(&self) -> Result<Vec<String>, String> {
        let session = self.login(ADMIN_USER, ADMIN_PASSWORD).await?;
        let rows = session
            .query_unpaged("SELECT role FROM system_auth.roles", ())
            .await
            .map_err(|e| e.to_string())?
            .into_rows_result()
            .map_err(|e| e.to_string())?;
        let mut roles = Vec::new();
        for row in rows.rows::<(String,)>().map_err(|e| e.to_string())? {
            let (role,) = row.map_err(|e| e.to_string())?;
            roles.push(role);
        }
        Ok(roles)
    }
}
