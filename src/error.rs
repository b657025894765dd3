//! Error handling module for the Docker image puller

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PullerError {
    /// The reference string could not be turned into domain, repository and tag
    #[error("Malformed image reference: {0}")]
    ReferenceMalformed(String),

    /// Challenge discovery or token acquisition failed for a registry domain
    #[error("Authentication error for {domain}: {message}")]
    Auth { domain: String, message: String },

    /// The registry answered a manifest, blob or tag request with a non-200 status
    #[error("Registry error: GET {url} returned HTTP {status}")]
    Registry { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Some references of a batch could not be pulled
    #[error("{failed} of {total} image(s) failed to pull")]
    Incomplete { failed: usize, total: usize },
}

impl PullerError {
    pub fn auth(domain: &str, message: impl Into<String>) -> Self {
        PullerError::Auth {
            domain: domain.to_string(),
            message: message.into(),
        }
    }

    /// Authentication failures poison the whole domain for the rest of a run
    pub fn is_auth(&self) -> bool {
        matches!(self, PullerError::Auth { .. })
    }

    /// HTTP status carried by registry errors
    pub fn status(&self) -> Option<u16> {
        match self {
            PullerError::Registry { status, .. } => Some(*status),
            PullerError::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PullerError {
    fn from(err: serde_json::Error) -> Self {
        PullerError::Parse(err.to_string())
    }
}

impl From<url::ParseError> for PullerError {
    fn from(err: url::ParseError) -> Self {
        PullerError::Configuration(format!("Invalid URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, PullerError>;
