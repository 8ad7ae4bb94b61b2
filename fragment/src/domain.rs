use std::fmt;

use serde::{Deserialize, Serialize};
use shared::{ConfigurationError, ExpireTime, Result};

use crate::key::{CacheKey, FragmentKey};
use crate::value::TemplateValue;

/// The inputs of one cached block: timeout, fragment name, vary-on values and
/// an optional store alias.
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentRequest {
    pub expire_time: TemplateValue,
    pub fragment_name: TemplateValue,
    pub vary_on: Vec<TemplateValue>,
    pub using: Option<String>,
}

impl FragmentRequest {
    pub fn new(
        expire_time: impl Into<TemplateValue>,
        fragment_name: impl Into<TemplateValue>,
    ) -> Self {
        Self {
            expire_time: expire_time.into(),
            fragment_name: fragment_name.into(),
            vary_on: Vec::new(),
            using: None,
        }
    }

    pub fn vary(mut self, value: impl Into<TemplateValue>) -> Self {
        self.vary_on.push(value.into());
        self
    }

    pub fn vary_on<I, T>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TemplateValue>,
    {
        self.vary_on.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn using(mut self, alias: impl Into<String>) -> Self {
        self.using = Some(alias.into());
        self
    }

    /// Validate the inputs and derive the cache key.
    ///
    /// The timeout is checked first, then the fragment name, then each vary-on
    /// value in order; the first failure is returned.
    pub fn resolve(&self) -> Result<ResolvedFragment> {
        let expire = self.expire_time.to_expire_time()?;

        let fragment_name = self.fragment_name.to_text(0)?;
        if fragment_name.is_empty() {
            return Err(ConfigurationError::EmptyFragmentName.into());
        }

        let vary_on = self
            .vary_on
            .iter()
            .enumerate()
            .map(|(position, value)| value.to_text(position).map(|text| text.into_owned()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let key = FragmentKey::new(fragment_name.into_owned(), vary_on)?;
        let cache_key = key.cache_key();

        Ok(ResolvedFragment {
            key,
            cache_key,
            expire,
        })
    }
}

/// A validated request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedFragment {
    pub key: FragmentKey,
    pub cache_key: CacheKey,
    pub expire: ExpireTime,
}

/// How a fragment value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Served from the store.
    Hit,
    /// Computed by this caller and written to the store.
    Miss,
    /// Computed by another caller of the same in-flight key.
    Shared,
    /// Computed without touching the store (zero timeout).
    Bypass,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Shared => write!(f, "SHARED"),
            Self::Bypass => write!(f, "BYPASS"),
        }
    }
}
