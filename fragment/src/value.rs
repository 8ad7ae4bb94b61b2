use std::borrow::Cow;
use std::fmt;

use shared::{ConfigurationError, ExpireTime};

/// A value handed over by the template context, before it is turned into
/// key material or a timeout.
///
/// Variable lookup happens outside this crate. A lookup that failed is passed
/// in as `Unresolved` so the cache can report which variable was missing.
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Null,
    Unresolved(String),
}

impl TemplateValue {
    pub fn unresolved(variable: impl Into<String>) -> Self {
        TemplateValue::Unresolved(variable.into())
    }

    /// Render the value as key material. `position` is only used to label
    /// encoding failures.
    pub fn to_text(&self, position: usize) -> Result<Cow<'_, str>, ConfigurationError> {
        match self {
            TemplateValue::Text(s) => Ok(Cow::Borrowed(s)),
            TemplateValue::Integer(n) => Ok(Cow::Owned(n.to_string())),
            TemplateValue::Float(f) => Ok(Cow::Owned(f.to_string())),
            TemplateValue::Bool(b) => Ok(Cow::Borrowed(if *b { "true" } else { "false" })),
            TemplateValue::Bytes(bytes) => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|e| ConfigurationError::Encoding {
                    position,
                    reason: e.to_string(),
                }),
            TemplateValue::Null => Ok(Cow::Borrowed("null")),
            TemplateValue::Unresolved(name) => {
                Err(ConfigurationError::UnknownVariable(name.clone()))
            }
        }
    }

    /// Coerce the value into a timeout the way an integer cast would.
    ///
    /// Floats are truncated toward zero, text must be a base-10 integer or
    /// `never`, and `Null` means the fragment never expires.
    pub fn to_expire_time(&self) -> Result<ExpireTime, ConfigurationError> {
        match self {
            TemplateValue::Integer(n) => ExpireTime::from_seconds(*n),
            TemplateValue::Text(s) => ExpireTime::parse(s),
            TemplateValue::Float(f) if f.is_finite() => ExpireTime::from_seconds(f.trunc() as i64),
            TemplateValue::Null => Ok(ExpireTime::Never),
            TemplateValue::Unresolved(name) => {
                Err(ConfigurationError::UnknownVariable(name.clone()))
            }
            other => Err(ConfigurationError::NonIntegerTimeout(other.to_string())),
        }
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateValue::Text(s) => f.write_str(s),
            TemplateValue::Integer(n) => write!(f, "{n}"),
            TemplateValue::Float(x) => write!(f, "{x}"),
            TemplateValue::Bool(b) => write!(f, "{b}"),
            TemplateValue::Bytes(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            TemplateValue::Null => f.write_str("null"),
            TemplateValue::Unresolved(name) => write!(f, "<unresolved {name}>"),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::Text(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::Text(s)
    }
}

impl From<&String> for TemplateValue {
    fn from(s: &String) -> Self {
        TemplateValue::Text(s.clone())
    }
}

impl From<i64> for TemplateValue {
    fn from(n: i64) -> Self {
        TemplateValue::Integer(n)
    }
}

impl From<i32> for TemplateValue {
    fn from(n: i32) -> Self {
        TemplateValue::Integer(n.into())
    }
}

impl From<u32> for TemplateValue {
    fn from(n: u32) -> Self {
        TemplateValue::Integer(n.into())
    }
}

impl From<u64> for TemplateValue {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => TemplateValue::Integer(n),
            Err(_) => TemplateValue::Text(n.to_string()),
        }
    }
}

impl From<usize> for TemplateValue {
    fn from(n: usize) -> Self {
        TemplateValue::from(n as u64)
    }
}

impl From<f64> for TemplateValue {
    fn from(x: f64) -> Self {
        TemplateValue::Float(x)
    }
}

impl From<bool> for TemplateValue {
    fn from(b: bool) -> Self {
        TemplateValue::Bool(b)
    }
}

impl From<Vec<u8>> for TemplateValue {
    fn from(bytes: Vec<u8>) -> Self {
        TemplateValue::Bytes(bytes)
    }
}

impl From<&[u8]> for TemplateValue {
    fn from(bytes: &[u8]) -> Self {
        TemplateValue::Bytes(bytes.to_vec())
    }
}

impl From<ExpireTime> for TemplateValue {
    fn from(expire: ExpireTime) -> Self {
        match expire {
            ExpireTime::Seconds(secs) => TemplateValue::from(secs),
            ExpireTime::Never => TemplateValue::Text(ExpireTime::NEVER_LITERAL.to_string()),
        }
    }
}

impl<T: Into<TemplateValue>> From<Option<T>> for TemplateValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(TemplateValue::Null)
    }
}
