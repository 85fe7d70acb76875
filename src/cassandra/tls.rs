//! Certificate bundle parsing and client TLS context construction.
//!
//! Bundles arrive either as a concatenation of PEM blocks (`pem_bundle`) or
//! as a JSON document with `certificate`, `private_key`, `issuing_ca` and
//! `ca_chain` fields (`pem_json`). Both are reduced to a [`TlsMaterial`],
//! which is turned into an openssl [`SslContext`] for the driver.

use std::fmt;
use std::str::FromStr;

use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslContext, SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::X509;
use serde::Deserialize;
use tracing::debug;
use x509_parser::pem::Pem;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::cassandra::PluginError;

/// Certificate material derived from the configuration.
///
/// Created once during initialization and reused for every session build.
#[derive(Clone, Default)]
pub struct TlsMaterial {
    /// Client certificate presented during the handshake.
    pub leaf: Option<X509>,
    /// Private key paired with `leaf`.
    pub key: Option<PKey<Private>>,
    /// Trust anchors for the server certificate.
    pub ca_chain: Vec<X509>,
}

// Key bytes must never end up in logs.
impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("leaf", &self.leaf.is_some())
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("ca_chain", &self.ca_chain.len())
            .finish()
    }
}

/// Lowest TLS protocol version the client will negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMinVersion {
    Tls10,
    Tls11,
    Tls12,
}

impl TlsMinVersion {
    pub fn ssl_version(self) -> SslVersion {
        match self {
            TlsMinVersion::Tls10 => SslVersion::TLS1,
            TlsMinVersion::Tls11 => SslVersion::TLS1_1,
            TlsMinVersion::Tls12 => SslVersion::TLS1_2,
        }
    }
}

impl FromStr for TlsMinVersion {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tls10" => Ok(TlsMinVersion::Tls10),
            "tls11" => Ok(TlsMinVersion::Tls11),
            "tls12" => Ok(TlsMinVersion::Tls12),
            other => Err(PluginError::Config(format!(
                "unrecognized TLS version provided: {:?}",
                other
            ))),
        }
    }
}

/// A client TLS configuration ready to be handed to the driver.
pub struct ClientTlsConfig {
    context: SslContext,
    pub server_name: Option<String>,
    pub insecure_skip_verify: bool,
    pub min_version: Option<TlsMinVersion>,
}

impl ClientTlsConfig {
    pub fn context(&self) -> &SslContext {
        &self.context
    }

    pub fn into_context(self) -> SslContext {
        self.context
    }
}

impl fmt::Debug for ClientTlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTlsConfig")
            .field("server_name", &self.server_name)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("min_version", &self.min_version)
            .finish_non_exhaustive()
    }
}

/// Walks the PEM blocks of `text` in order.
///
/// Non-CA certificates become the leaf, CA certificates are appended to the
/// chain. Any block type other than a certificate or an unencrypted private
/// key is rejected.
pub fn parse_pem_bundle(text: &str) -> Result<TlsMaterial, PluginError> {
    if text.trim().is_empty() {
        return Err(PluginError::Config("empty pem bundle".into()));
    }

    let mut material = TlsMaterial::default();
    let mut blocks = 0usize;

    for block in Pem::iter_from_buffer(text.as_bytes()) {
        let block = block
            .map_err(|e| PluginError::Config(format!("error parsing pem bundle: {}", e)))?;
        blocks += 1;

        match block.label.as_str() {
            "CERTIFICATE" => {
                let is_ca = certificate_is_ca(&block.contents)?;
                let cert = X509::from_der(&block.contents).map_err(|e| {
                    PluginError::Config(format!("error parsing certificate: {}", e))
                })?;
                if is_ca {
                    material.ca_chain.push(cert);
                } else if material.leaf.is_some() {
                    return Err(PluginError::Config(
                        "multiple leaf certificates found in pem bundle".into(),
                    ));
                } else {
                    material.leaf = Some(cert);
                }
            }
            "RSA PRIVATE KEY" | "EC PRIVATE KEY" | "PRIVATE KEY" => {
                if material.key.is_some() {
                    return Err(PluginError::Config(
                        "more than one private key given; provide only one private key in the bundle"
                            .into(),
                    ));
                }
                let key = PKey::private_key_from_der(&block.contents).map_err(|e| {
                    PluginError::Config(format!("error parsing private key: {}", e))
                })?;
                material.key = Some(key);
            }
            other => {
                return Err(PluginError::Config(format!(
                    "unsupported PEM block type {:?} in pem bundle",
                    other
                )));
            }
        }
    }

    if blocks == 0 {
        return Err(PluginError::Config("no data found in pem bundle".into()));
    }

    debug!(
        leaf = material.leaf.is_some(),
        key = material.key.is_some(),
        ca_chain = material.ca_chain.len(),
        "parsed pem bundle"
    );
    Ok(material)
}

#[derive(Debug, Default, Deserialize)]
struct JsonBundle {
    #[serde(default)]
    certificate: String,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    issuing_ca: String,
    #[serde(default)]
    ca_chain: Vec<String>,
}

/// Parses the JSON wrapper form of a certificate bundle.
///
/// `issuing_ca` alone is promoted to a one-element chain; setting it next to a
/// non-empty `ca_chain` is rejected.
pub fn parse_json_bundle(text: &str) -> Result<TlsMaterial, PluginError> {
    let bundle: JsonBundle = serde_json::from_str(text)
        .map_err(|e| PluginError::Config(format!("failed to parse given pem_json: {}", e)))?;

    let chain = match (bundle.issuing_ca.trim().is_empty(), bundle.ca_chain.is_empty()) {
        (false, false) => {
            return Err(PluginError::Config(
                "issuing_ca and ca_chain cannot both be set in pem_json".into(),
            ))
        }
        (false, true) => vec![bundle.issuing_ca],
        (true, _) => bundle.ca_chain,
    };

    let mut material = TlsMaterial::default();

    if !bundle.certificate.trim().is_empty() {
        let cert = X509::from_pem(bundle.certificate.as_bytes()).map_err(|e| {
            PluginError::Config(format!("error parsing certificate: {}", e))
        })?;
        material.leaf = Some(cert);
    }

    if !bundle.private_key.trim().is_empty() {
        let key = PKey::private_key_from_pem(bundle.private_key.as_bytes()).map_err(|e| {
            PluginError::Config(format!("error parsing private key: {}", e))
        })?;
        material.key = Some(key);
    }

    for entry in chain.iter().filter(|c| !c.trim().is_empty()) {
        let certs = X509::stack_from_pem(entry.as_bytes()).map_err(|e| {
            PluginError::Config(format!("error parsing CA certificate: {}", e))
        })?;
        if certs.is_empty() {
            return Err(PluginError::Config(
                "no certificate found in ca_chain entry".into(),
            ));
        }
        material.ca_chain.extend(certs);
    }

    Ok(material)
}

/// Builds the client context from parsed material.
///
/// Without a CA chain the system trust store is used. `server_name` enables
/// host name verification unless verification is disabled altogether.
pub fn to_client_config(
    material: &TlsMaterial,
    min_version: Option<TlsMinVersion>,
    server_name: Option<&str>,
    insecure: bool,
) -> Result<ClientTlsConfig, PluginError> {
    let mut builder = SslContextBuilder::new(SslMethod::tls_client()).map_err(ssl_config_error)?;

    match (&material.leaf, &material.key) {
        (Some(leaf), Some(key)) => {
            builder.set_certificate(leaf).map_err(ssl_config_error)?;
            builder.set_private_key(key).map_err(ssl_config_error)?;
            builder.check_private_key().map_err(|e| {
                PluginError::Config(format!("private key does not match certificate: {}", e))
            })?;
        }
        (None, None) => {}
        (Some(_), None) => {
            return Err(PluginError::Config(
                "client certificate provided without a private key".into(),
            ))
        }
        (None, Some(_)) => {
            return Err(PluginError::Config(
                "private key provided without a client certificate".into(),
            ))
        }
    }

    if material.ca_chain.is_empty() {
        builder
            .set_default_verify_paths()
            .map_err(ssl_config_error)?;
    } else {
        let mut store = X509StoreBuilder::new().map_err(ssl_config_error)?;
        for (idx, ca) in material.ca_chain.iter().enumerate() {
            store.add_cert(ca.clone()).map_err(|e| {
                PluginError::Config(format!(
                    "could not add CA certificate {} to the root pool: {}",
                    idx, e
                ))
            })?;
        }
        builder.set_cert_store(store.build());
    }

    if insecure {
        builder.set_verify(SslVerifyMode::NONE);
    } else {
        builder.set_verify(SslVerifyMode::PEER);
        if let Some(name) = server_name {
            builder
                .verify_param_mut()
                .set_host(name)
                .map_err(ssl_config_error)?;
        }
    }

    builder
        .set_min_proto_version(min_version.map(TlsMinVersion::ssl_version))
        .map_err(ssl_config_error)?;

    Ok(ClientTlsConfig {
        context: builder.build(),
        server_name: server_name.map(str::to_string),
        insecure_skip_verify: insecure,
        min_version,
    })
}

fn certificate_is_ca(der: &[u8]) -> Result<bool, PluginError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| PluginError::Config(format!("error parsing certificate: {}", e)))?;
    Ok(cert
        .basic_constraints()
        .ok()
        .flatten()
        .map(|bc| bc.value.ca)
        .unwrap_or(false))
}

fn ssl_config_error(err: openssl::error::ErrorStack) -> PluginError {
    PluginError::Config(format!("error building TLS configuration: {}", err))
}
