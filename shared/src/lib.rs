// shared/src/lib.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod config;

/// Boxed error returned by a fragment's compute callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("compute failed: {0}")]
    Compute(#[source] Arc<dyn std::error::Error + Send + Sync>),
    #[error("store error: {0}")]
    Store(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a compute callback failure, keeping the original error as source.
    pub fn compute(err: impl Into<BoxError>) -> Self {
        Error::Compute(Arc::from(err.into()))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

/// Problems with the inputs of a cached fragment. Never retryable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("fragment cache got a non-integer timeout value: {0:?}")]
    NonIntegerTimeout(String),
    #[error("fragment cache got a negative timeout value: {0}")]
    NegativeTimeout(i64),
    #[error("fragment cache got an unknown variable: {0:?}")]
    UnknownVariable(String),
    #[error("fragment name must not be empty")]
    EmptyFragmentName,
    #[error("vary-on value at position {position} is not valid text: {reason}")]
    Encoding { position: usize, reason: String },
    #[error("no cache store registered under alias {0:?}")]
    UnknownCache(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lifetime of a stored fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExpireTime {
    /// Expire after this many seconds. Zero means the value is never stored.
    Seconds(u64),
    /// Keep until the store evicts it.
    Never,
}

impl ExpireTime {
    pub const NEVER_LITERAL: &'static str = "never";

    /// Validate an integer timeout. Negative values are rejected rather than
    /// treated as "never".
    pub fn from_seconds(secs: i64) -> std::result::Result<Self, ConfigurationError> {
        u64::try_from(secs)
            .map(ExpireTime::Seconds)
            .map_err(|_| ConfigurationError::NegativeTimeout(secs))
    }

    /// Parse a textual timeout: a base-10 integer (surrounding whitespace
    /// allowed) or the literal `never`.
    pub fn parse(raw: &str) -> std::result::Result<Self, ConfigurationError> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(Self::NEVER_LITERAL) {
            return Ok(ExpireTime::Never);
        }
        let secs = trimmed
            .parse::<i64>()
            .map_err(|_| ConfigurationError::NonIntegerTimeout(raw.to_string()))?;
        Self::from_seconds(secs)
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            ExpireTime::Seconds(secs) => Some(Duration::from_secs(*secs)),
            ExpireTime::Never => None,
        }
    }

    /// Whether a value with this lifetime should be written at all.
    pub fn is_storable(&self) -> bool {
        !matches!(self, ExpireTime::Seconds(0))
    }
}

impl fmt::Display for ExpireTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpireTime::Seconds(secs) => write!(f, "{secs}s"),
            ExpireTime::Never => f.write_str(Self::NEVER_LITERAL),
        }
    }
}
