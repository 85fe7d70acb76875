//! CQL statement templates supplied per role.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CREATION_CQL: &str =
    "CREATE USER '{{username}}' WITH PASSWORD '{{password}}' NOSUPERUSER;";
pub const DEFAULT_ROLLBACK_CQL: &str = "DROP USER '{{username}}';";
pub const DEFAULT_REVOCATION_CQL: &str = DEFAULT_ROLLBACK_CQL;

/// A role's CQL templates. Each field may hold several `;`-separated
/// statements; empty fields fall back to the defaults above.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statements {
    pub creation_statements: String,
    pub rollback_statements: String,
    pub revocation_statements: String,
    pub renew_statements: String,
}

impl Statements {
    pub fn creation(&self) -> &str {
        or_default(&self.creation_statements, DEFAULT_CREATION_CQL)
    }

    pub fn rollback(&self) -> &str {
        or_default(&self.rollback_statements, DEFAULT_ROLLBACK_CQL)
    }

    pub fn revocation(&self) -> &str {
        or_default(&self.revocation_statements, DEFAULT_REVOCATION_CQL)
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

/// Splits on `;`, trims each fragment and drops the empty ones.
pub fn split_statements(cql: &str) -> impl Iterator<Item = &str> {
    cql.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Replaces every `{{name}}` occurrence with its value, once, as plain text.
///
/// Cassandra user-management DDL does not take bound parameters, so the
/// templates are trusted input from the host.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after.find("}}").and_then(|end| {
            let name = &after[..end];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });
        match value {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
