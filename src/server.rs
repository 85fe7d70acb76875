//! Host adapter speaking newline-delimited JSON.
//!
//! Each input line is one request:
//!
//! ```text
//! {"id":1,"method":"initialize","config":{"hosts":"127.0.0.1","username":"cassandra","password":"cassandra"}}
//! {"id":2,"method":"create_user","statements":{},"username_config":{"display_name":"token","role_name":"ro"}}
//! ```
//!
//! and yields exactly one response line, `{"id":..,"ok":true,"result":..}` or
//! `{"id":..,"ok":false,"error":{"kind":..,"message":..}}`. Requests are
//! handled one at a time in arrival order.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::cassandra::{PluginError, Statements, UsernameConfig};
use crate::interface::Database;

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Value,
    #[serde(flatten)]
    request: Request,
}

#[derive(Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
enum Request {
    Type,
    Initialize {
        #[serde(default)]
        config: Map<String, Value>,
        #[serde(default)]
        verify_connection: Option<bool>,
    },
    CreateUser {
        #[serde(default)]
        statements: Statements,
        #[serde(default)]
        username_config: UsernameConfig,
        /// Unix seconds; defaults to now.
        #[serde(default)]
        expiration: Option<u64>,
    },
    RenewUser {
        #[serde(default)]
        statements: Statements,
        username: String,
        #[serde(default)]
        expiration: Option<u64>,
    },
    RevokeUser {
        #[serde(default)]
        statements: Statements,
        username: String,
    },
    Close,
}

impl Request {
    fn method(&self) -> &'static str {
        match self {
            Request::Type => "type",
            Request::Initialize { .. } => "initialize",
            Request::CreateUser { .. } => "create_user",
            Request::RenewUser { .. } => "renew_user",
            Request::RevokeUser { .. } => "revoke_user",
            Request::Close => "close",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl Response {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, kind: &'static str, message: String) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(ErrorBody { kind, message }),
        }
    }
}

fn expiration_time(secs: Option<u64>) -> SystemTime {
    secs.map(|s| UNIX_EPOCH + Duration::from_secs(s))
        .unwrap_or_else(SystemTime::now)
}

async fn dispatch(
    plugin: &dyn Database,
    request: Request,
    default_verify: bool,
) -> Result<Value, PluginError> {
    match request {
        Request::Type => Ok(json!({ "type": plugin.type_name() })),
        Request::Initialize {
            config,
            verify_connection,
        } => {
            plugin
                .initialize(&config, verify_connection.unwrap_or(default_verify))
                .await?;
            Ok(Value::Null)
        }
        Request::CreateUser {
            statements,
            username_config,
            expiration,
        } => {
            let (username, password) = plugin
                .create_user(&statements, &username_config, expiration_time(expiration))
                .await?;
            Ok(json!({ "username": username, "password": password }))
        }
        Request::RenewUser {
            statements,
            username,
            expiration,
        } => {
            plugin
                .renew_user(&statements, &username, expiration_time(expiration))
                .await?;
            Ok(Value::Null)
        }
        Request::RevokeUser {
            statements,
            username,
        } => {
            plugin.revoke_user(&statements, &username).await?;
            Ok(Value::Null)
        }
        Request::Close => {
            plugin.close().await?;
            Ok(Value::Null)
        }
    }
}

async fn handle_line(plugin: &dyn Database, line: &str, default_verify: bool) -> Response {
    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Rejected malformed request: {}", e);
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| v.get("id").cloned())
                .unwrap_or(Value::Null);
            return Response::err(id, "request", format!("invalid request: {}", e));
        }
    };

    let method = envelope.request.method();
    debug!(id = %envelope.id, method, "Handling request");
    match dispatch(plugin, envelope.request, default_verify).await {
        Ok(result) => Response::ok(envelope.id, result),
        Err(e) => {
            error!(method, kind = e.kind(), "Request failed: {}", e);
            Response::err(envelope.id, e.kind(), e.to_string())
        }
    }
}

async fn serve_lines<R, W>(
    plugin: &dyn Database,
    reader: &mut R,
    writer: &mut W,
    default_verify: bool,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                handle_line(plugin, line, default_verify).await
            }
            Err(e) => {
                warn!("Rejected request that is not valid UTF-8: {}", e);
                Response::err(Value::Null, "request", format!("invalid request: {}", e))
            }
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }
}

/// Serves requests from `reader` until end of input, then closes the plugin.
///
/// The plugin is closed even when reading or writing fails.
pub async fn serve<R, W>(
    plugin: &dyn Database,
    mut reader: R,
    mut writer: W,
    default_verify: bool,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Serving {} plugin requests", plugin.type_name());
    let served = serve_lines(plugin, &mut reader, &mut writer, default_verify).await;
    match &served {
        Ok(()) => info!("Input closed, shutting down"),
        Err(e) => error!("Host transport failed, shutting down: {}", e),
    }
    plugin.close().await?;
    served
}
