//! Username and password generation.

use std::time::{SystemTime, UNIX_EPOCH};

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cassandra::PluginError;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const DISPLAY_NAME_MAX: usize = 15;
const ROLE_NAME_MAX: usize = 15;
const RANDOM_SUFFIX_LEN: usize = 20;
const USERNAME_MAX: usize = 100;

/// Metadata the host sends to shape a new username.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsernameConfig {
    pub display_name: String,
    pub role_name: String,
}

impl UsernameConfig {
    pub fn new(display_name: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            role_name: role_name.into(),
        }
    }
}

/// Produces usernames and passwords from the system CSPRNG.
pub struct CredentialsProducer {
    rng: SystemRandom,
}

impl Default for CredentialsProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialsProducer {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    /// Generates a unique username.
    ///
    /// With a role name: `v_<display>_<role>_<20 alphanumerics>_<unix seconds>`,
    /// display and role truncated to 15 characters. Without one:
    /// `vault_<display>_<uuid>_<unix seconds>`. `-` is replaced by `_` in both;
    /// lowercasing is left to the caller.
    pub fn generate_username(&self, config: &UsernameConfig) -> Result<String, PluginError> {
        let now = unix_seconds()?;
        let display = sanitize(&config.display_name);

        let username = if config.role_name.is_empty() {
            format!("vault_{}_{}_{}", display, self.uuid()?, now)
        } else {
            let role = sanitize(&config.role_name);
            let mut name = format!(
                "v_{}_{}_{}_{}",
                truncate(&display, DISPLAY_NAME_MAX),
                truncate(&role, ROLE_NAME_MAX),
                self.alphanumeric(RANDOM_SUFFIX_LEN)?,
                now
            );
            name.truncate(USERNAME_MAX);
            name
        };

        Ok(username.replace('-', "_"))
    }

    /// A fresh v4 UUID string, 122 bits of it random.
    pub fn generate_password(&self) -> Result<String, PluginError> {
        Ok(self.uuid()?.to_string())
    }

    /// Cassandra has no native credential expiry.
    pub fn generate_expiration(&self, _expiration: SystemTime) -> String {
        String::new()
    }

    fn uuid(&self) -> Result<Uuid, PluginError> {
        let mut bytes = [0u8; 16];
        self.fill(&mut bytes)?;
        Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    fn alphanumeric(&self, len: usize) -> Result<String, PluginError> {
        // Rejection sampling keeps the distribution uniform over 62 symbols.
        let limit = (256 / ALPHANUMERIC.len() * ALPHANUMERIC.len()) as u8;
        let mut out = String::with_capacity(len);
        let mut buf = [0u8; 32];
        while out.len() < len {
            self.fill(&mut buf)?;
            for b in buf.iter().filter(|b| **b < limit) {
                if out.len() == len {
                    break;
                }
                out.push(ALPHANUMERIC[(*b as usize) % ALPHANUMERIC.len()] as char);
            }
        }
        Ok(out)
    }

    fn fill(&self, buf: &mut [u8]) -> Result<(), PluginError> {
        self.rng
            .fill(buf)
            .map_err(|_| PluginError::Generation("failed to read from system random source".into()))
    }
}

fn unix_seconds() -> Result<u64, PluginError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| PluginError::Generation(format!("system clock before unix epoch: {}", e)))
}

/// Keeps `[A-Za-z0-9_-]`; anything else becomes `_`.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn truncate(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
