use thiserror::Error;

/// Errors raised while locating, parsing, or validating a collection profile.
///
/// Every variant is fatal to a run: the orchestrator never starts with a
/// partially-understood configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration profile '{name}' not found in {dir}; available: [{}]", available.join(", "))]
    ProfileNotFound {
        name: String,
        dir: String,
        available: Vec<String>,
    },

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing required configuration key: {0}")]
    MissingKey(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
