use pronos_core::FailureKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A page could not be turned into records.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The structural marker that identifies the data on the page is absent.
    /// Either the layout changed or this is an error page.
    #[error("structural marker {marker} not found on {url}")]
    MissingMarker { marker: String, url: String },

    #[error("invalid CSS selector {selector}: {reason}")]
    Selector { selector: String, reason: String },
}

impl ExtractError {
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        FailureKind::ParseError
    }

    pub(crate) fn missing(marker: &str, url: &str) -> Self {
        Self::MissingMarker {
            marker: marker.to_string(),
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to fetch league table {url} ({kind}): {message}")]
    Fetch {
        url: String,
        kind: FailureKind,
        message: String,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("unknown team: {name}")]
    UnknownTeam { name: String },

    #[error("team cache I/O error at {path}: {source}")]
    CacheIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("team cache at {path} is not valid JSON: {source}")]
    CacheFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RegistryError {
    /// The failure kind a target inherits when its team cannot be resolved.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            RegistryError::Fetch { kind, .. } => *kind,
            RegistryError::Extract(_) | RegistryError::CacheFormat { .. } => {
                FailureKind::ParseError
            }
            RegistryError::UnknownTeam { .. } => FailureKind::UnknownTeam,
            RegistryError::CacheIo { .. } => FailureKind::NotFound,
        }
    }
}
