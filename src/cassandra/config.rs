//! Connection configuration for the Cassandra plugin.
//!
//! The host hands over a string-keyed map whose values may be strings,
//! numbers or booleans depending on the transport. Values are converted
//! leniently at this boundary (`"true"` is a boolean, `"20s"` and `20` are
//! durations) and everything past [`ConnectionConfig::from_map`] works with
//! typed values.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use scylla::statement::Consistency;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::cassandra::tls::{self, ClientTlsConfig, TlsMaterial, TlsMinVersion};
use crate::cassandra::PluginError;

/// Port used when the configuration leaves `port` at zero.
pub const DEFAULT_PORT: u16 = 9042;

/// Native protocol version assumed when none is configured.
pub const DEFAULT_PROTOCOL_VERSION: i32 = 4;

/// Raw shape of the configuration map, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(deserialize_with = "lenient::hosts")]
    hosts: Vec<String>,
    #[serde(deserialize_with = "lenient::int")]
    port: i64,
    #[serde(deserialize_with = "lenient::string")]
    username: String,
    #[serde(deserialize_with = "lenient::string")]
    password: String,
    #[serde(deserialize_with = "lenient::boolean")]
    tls: bool,
    #[serde(deserialize_with = "lenient::boolean")]
    insecure_tls: bool,
    #[serde(deserialize_with = "lenient::int")]
    protocol_version: i64,
    #[serde(deserialize_with = "lenient::duration")]
    connect_timeout: Duration,
    #[serde(deserialize_with = "lenient::string")]
    tls_min_version: String,
    #[serde(deserialize_with = "lenient::string")]
    consistency: String,
    #[serde(deserialize_with = "lenient::string")]
    pem_bundle: String,
    #[serde(deserialize_with = "lenient::string")]
    pem_json: String,
    #[serde(deserialize_with = "lenient::string")]
    local_datacenter: String,
    #[serde(deserialize_with = "lenient::duration")]
    socket_keep_alive: Duration,
    #[serde(deserialize_with = "lenient::boolean")]
    skip_verification: bool,
}

/// Validated connection settings. Immutable once built.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub hosts: Vec<String>,
    pub port: u16,
    pub username: String,
    password: String,
    pub protocol_version: i32,
    /// `None` leaves the driver default in place.
    pub connect_timeout: Option<Duration>,
    pub consistency: Option<Consistency>,
    pub tls: bool,
    pub insecure_tls: bool,
    pub tls_min_version: Option<TlsMinVersion>,
    pub tls_material: Option<TlsMaterial>,
    pub local_datacenter: Option<String>,
    pub socket_keep_alive: Option<Duration>,
    pub skip_verification: bool,
}

impl ConnectionConfig {
    /// Decodes and validates the host-supplied configuration map.
    pub fn from_map(raw: &Map<String, Value>) -> Result<Self, PluginError> {
        let raw: RawConfig = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| PluginError::Config(format!("error decoding configuration: {}", e)))?;

        if raw.hosts.is_empty() {
            return Err(PluginError::Config("hosts cannot be empty".into()));
        }
        if raw.username.is_empty() {
            return Err(PluginError::Config("username cannot be empty".into()));
        }
        if raw.password.is_empty() {
            return Err(PluginError::Config("password cannot be empty".into()));
        }

        let port = u16::try_from(raw.port)
            .map_err(|_| PluginError::Config(format!("invalid port: {}", raw.port)))?;

        let protocol_version = match raw.protocol_version {
            0 => DEFAULT_PROTOCOL_VERSION,
            v @ 1..=5 => v as i32,
            v => {
                return Err(PluginError::Config(format!(
                    "unsupported protocol_version: {}",
                    v
                )))
            }
        };
        if protocol_version != DEFAULT_PROTOCOL_VERSION {
            warn!(
                requested = protocol_version,
                "driver negotiates native protocol v4; requested protocol_version is recorded only"
            );
        }

        let tls_min_version = match raw.tls_min_version.trim() {
            "" => None,
            v => Some(v.parse::<TlsMinVersion>()?),
        };

        let consistency = match raw.consistency.trim() {
            "" => None,
            v => Some(parse_consistency(v)?),
        };

        let tls_material = match (raw.pem_bundle.trim(), raw.pem_json.trim()) {
            ("", "") => None,
            (bundle, "") => Some(tls::parse_pem_bundle(bundle)?),
            ("", json) => Some(tls::parse_json_bundle(json)?),
            _ => {
                return Err(PluginError::Config(
                    "must specify only one of pem_bundle or pem_json".into(),
                ))
            }
        };

        let config = ConnectionConfig {
            hosts: raw.hosts,
            port,
            username: raw.username,
            password: raw.password,
            protocol_version,
            connect_timeout: non_zero(raw.connect_timeout),
            consistency,
            tls: raw.tls || tls_material.is_some(),
            insecure_tls: raw.insecure_tls,
            tls_min_version,
            tls_material,
            local_datacenter: Some(raw.local_datacenter).filter(|dc| !dc.is_empty()),
            socket_keep_alive: non_zero(raw.socket_keep_alive),
            skip_verification: raw.skip_verification,
        };

        // Build the context once so pairing and trust-pool problems surface now.
        if config.tls {
            config.client_tls_config()?;
        }

        Ok(config)
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Seed endpoints as `host:port`, with the configured port applied to
    /// hosts that do not carry their own.
    pub fn contact_points(&self) -> Vec<String> {
        let port = if self.port == 0 { DEFAULT_PORT } else { self.port };
        self.hosts
            .iter()
            .map(|host| {
                if host.parse::<SocketAddr>().is_ok() {
                    host.clone()
                } else if let Ok(IpAddr::V6(ip)) = host.parse::<IpAddr>() {
                    format!("[{}]:{}", ip, port)
                } else if host.matches(':').count() == 1 {
                    host.clone()
                } else {
                    format!("{}:{}", host, port)
                }
            })
            .collect()
    }

    /// Client TLS configuration derived from the stored material. Only CA
    /// level trust (or none at all) yields a context without a client
    /// identity.
    pub fn client_tls_config(&self) -> Result<ClientTlsConfig, PluginError> {
        let empty = TlsMaterial::default();
        let material = self.tls_material.as_ref().unwrap_or(&empty);
        tls::to_client_config(material, self.tls_min_version, None, self.insecure_tls)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("hosts", &self.hosts)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("protocol_version", &self.protocol_version)
            .field("connect_timeout", &self.connect_timeout)
            .field("consistency", &self.consistency)
            .field("tls", &self.tls)
            .field("insecure_tls", &self.insecure_tls)
            .field("tls_min_version", &self.tls_min_version)
            .field("tls_material", &self.tls_material)
            .field("local_datacenter", &self.local_datacenter)
            .field("socket_keep_alive", &self.socket_keep_alive)
            .field("skip_verification", &self.skip_verification)
            .finish()
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d.is_zero() {
        None
    } else {
        Some(d)
    }
}

/// Consistency level names as accepted by Cassandra tooling, case-insensitive.
pub fn parse_consistency(value: &str) -> Result<Consistency, PluginError> {
    let consistency = match value.to_ascii_uppercase().as_str() {
        "ANY" => Consistency::Any,
        "ONE" => Consistency::One,
        "TWO" => Consistency::Two,
        "THREE" => Consistency::Three,
        "QUORUM" => Consistency::Quorum,
        "ALL" => Consistency::All,
        "LOCAL_QUORUM" => Consistency::LocalQuorum,
        "EACH_QUORUM" => Consistency::EachQuorum,
        "LOCAL_ONE" => Consistency::LocalOne,
        _ => {
            return Err(PluginError::Config(format!(
                "invalid consistency value: {:?}",
                value
            )))
        }
    };
    Ok(consistency)
}

/// Weakly-typed field decoders for the configuration map.
mod lenient {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s),
            Value::Bool(b) => Ok(if b { "1".into() } else { "0".into() }),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(D::Error::custom("expected a string")),
        }
    }

    pub fn boolean<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(b),
            Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            Value::String(s) => match s.trim() {
                "" => Ok(false),
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
                other => Err(D::Error::custom(format!(
                    "cannot parse {:?} as a boolean",
                    other
                ))),
            },
            _ => Err(D::Error::custom("expected a boolean")),
        }
    }

    pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(0),
            Value::Bool(b) => Ok(b as i64),
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| D::Error::custom(format!("expected an integer, got {}", n))),
            Value::String(s) => match s.trim() {
                "" => Ok(0),
                t => t
                    .parse::<i64>()
                    .map_err(|_| D::Error::custom(format!("cannot parse {:?} as an integer", t))),
            },
            _ => Err(D::Error::custom("expected an integer")),
        }
    }

    /// Bare numbers are seconds; strings may also carry a unit (`"20s"`, `"1m 30s"`).
    pub fn duration<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(Duration::ZERO),
            Value::Number(n) => {
                let secs = n
                    .as_f64()
                    .ok_or_else(|| D::Error::custom("invalid duration"))?;
                Duration::try_from_secs_f64(secs)
                    .map_err(|_| D::Error::custom(format!("invalid duration: {}", n)))
            }
            Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return Ok(Duration::ZERO);
                }
                if let Ok(secs) = t.parse::<u64>() {
                    return Ok(Duration::from_secs(secs));
                }
                humantime::parse_duration(t)
                    .map_err(|e| D::Error::custom(format!("invalid duration {:?}: {}", t, e)))
            }
            _ => Err(D::Error::custom("expected a duration")),
        }
    }

    /// Comma-separated string or a list of strings.
    pub fn hosts<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let parts: Vec<String> = match Value::deserialize(d)? {
            Value::Null => Vec::new(),
            Value::String(s) => s.split(',').map(str::to_string).collect(),
            Value::Array(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s),
                    other => Err(D::Error::custom(format!("invalid host entry: {}", other))),
                })
                .collect::<Result<_, _>>()?,
            _ => return Err(D::Error::custom("expected a comma-separated host list")),
        };
        Ok(parts
            .into_iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect())
    }
}
