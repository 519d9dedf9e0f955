//! Huginn error types

use std::fmt;
use std::time::Duration;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("empty response from model")]
    EmptyResponse,

    // Availability / fallback errors
    /// Provider was skipped: rate limited, failed its health probe, or
    /// missing a required credential.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Every candidate provider was skipped or failed.
    #[error("all providers failed: {}", ProviderFailure::summarize(.failures))]
    AllProvidersFailed { failures: Vec<ProviderFailure> },

    #[error("no provider configured")]
    NoProvider,

    #[error("provider does not support this operation")]
    Unsupported,

    // Embedding integrity errors
    #[error("dimension mismatch for model '{model}': {reason}")]
    DimensionMismatch { model: String, reason: String },

    #[error("invalid vector: {0}")]
    InvalidVector(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// One provider's last error inside an [`HuginnError::AllProvidersFailed`].
#[derive(Debug)]
pub struct ProviderFailure {
    /// Provider tag (e.g. `"openai"`).
    pub provider: String,
    /// The error that made this provider fail or be skipped.
    pub error: HuginnError,
}

impl ProviderFailure {
    pub fn new(provider: impl Into<String>, error: HuginnError) -> Self {
        Self {
            provider: provider.into(),
            error,
        }
    }

    fn summarize(failures: &[ProviderFailure]) -> String {
        if failures.is_empty() {
            return "no candidate providers".to_string();
        }
        failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

impl HuginnError {
    /// Whether this error is worth retrying on the same provider.
    ///
    /// Used for logging and metrics only: the retry handler deliberately
    /// retries every non-rate-limit failure up to its bound.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) | Self::RateLimited { .. } | Self::EmptyResponse => {
                true
            }
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this error is an explicit rate-limit signal (HTTP 429).
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Api { status: 429, .. }
        )
    }

    /// Provider-supplied wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Per-provider causes carried by an aggregate failure.
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            Self::AllProvidersFailed { failures } => failures,
            _ => &[],
        }
    }
}

impl From<reqwest::Error> for HuginnError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            HuginnError::InvalidInput(format!("malformed provider response: {err}"))
        } else {
            HuginnError::Http(err.to_string())
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_classification() {
        assert!(HuginnError::RateLimited { retry_after: None }.is_rate_limit());
        assert!(
            HuginnError::Api {
                status: 429,
                message: "slow down".into()
            }
            .is_rate_limit()
        );
        assert!(!HuginnError::Http("reset".into()).is_rate_limit());
    }

    #[test]
    fn transient_classification() {
        assert!(HuginnError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(
            HuginnError::Api {
                status: 503,
                message: "loading".into()
            }
            .is_transient()
        );
        assert!(!HuginnError::AuthenticationFailed.is_transient());
    }

    #[test]
    fn aggregate_message_names_every_provider() {
        let err = HuginnError::AllProvidersFailed {
            failures: vec![
                ProviderFailure::new("openai", HuginnError::AuthenticationFailed),
                ProviderFailure::new(
                    "ollama",
                    HuginnError::ProviderUnavailable("health probe failed".into()),
                ),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("openai: authentication failed"));
        assert!(msg.contains("ollama: provider unavailable"));
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn aggregate_without_candidates() {
        let err = HuginnError::AllProvidersFailed { failures: vec![] };
        assert!(err.to_string().contains("no candidate providers"));
    }
}
