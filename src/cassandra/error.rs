use std::fmt;

/// Errors surfaced by the Cassandra plugin.
///
/// Messages carry Cassandra and parser text through, but never passwords or
/// certificate material.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("plugin is not initialized")]
    NotInitialized,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("credential generation error: {0}")]
    Generation(String),

    #[error("{}", CompositeDisplay(.0))]
    Composite(Vec<PluginError>),
}

impl PluginError {
    /// Folds collected errors into a result: `Ok` when empty, a composite
    /// otherwise.
    pub fn from_many(errors: Vec<PluginError>) -> Result<(), PluginError> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PluginError::Composite(errors))
        }
    }

    /// Short machine-readable name used by the host adapter.
    pub fn kind(&self) -> &'static str {
        match self {
            PluginError::Config(_) => "config",
            PluginError::NotInitialized => "not_initialized",
            PluginError::Connection(_) => "connection",
            PluginError::Query(_) => "query",
            PluginError::Generation(_) => "generation",
            PluginError::Composite(_) => "composite",
        }
    }
}

struct CompositeDisplay<'a>(&'a [PluginError]);

impl fmt::Display for CompositeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            write!(f, "1 error occurred:")?;
        } else {
            write!(f, "{} errors occurred:", self.0.len())?;
        }
        for err in self.0 {
            write!(f, "\n\t* {}", err)?;
        }
        writeln!(f)?;
        writeln!(f)
    }
}
