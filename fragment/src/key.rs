//! Cache key derivation for template fragments.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::ConfigurationError;

/// Namespace shared by every fragment key.
pub const KEY_PREFIX: &str = "template.cache";

const VARY_ON_SEPARATOR: &str = ":";

/// Key under which a fragment is stored: `template.cache.<name>.<sha256 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digest part of the key.
    pub fn digest(&self) -> &str {
        self.0
            .rsplit_once('.')
            .map(|(_, digest)| digest)
            .unwrap_or_default()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Logical identity of a fragment: its name plus the ordered vary-on values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    fragment_name: String,
    vary_on: Vec<String>,
}

impl FragmentKey {
    pub fn new(
        fragment_name: impl Into<String>,
        vary_on: Vec<String>,
    ) -> Result<Self, ConfigurationError> {
        let fragment_name = fragment_name.into();
        if fragment_name.is_empty() {
            return Err(ConfigurationError::EmptyFragmentName);
        }
        Ok(Self {
            fragment_name,
            vary_on,
        })
    }

    pub fn fragment_name(&self) -> &str {
        &self.fragment_name
    }

    pub fn vary_on(&self) -> &[String] {
        &self.vary_on
    }

    pub fn cache_key(&self) -> CacheKey {
        make_template_fragment_key(&self.fragment_name, &self.vary_on)
    }
}

/// Derive the store key for a fragment.
///
/// Each vary-on value is percent-encoded before the values are joined, so a
/// value containing the separator cannot shift a boundary: `["a:b", "c"]` and
/// `["a", "b:c"]` hash differently. An empty list and `[""]` both join to
/// the empty string and share a key.
pub fn make_template_fragment_key<S: AsRef<str>>(fragment_name: &str, vary_on: &[S]) -> CacheKey {
    CacheKey(format!(
        "{KEY_PREFIX}.{fragment_name}.{}",
        vary_on_digest(vary_on)
    ))
}

/// Lowercase hex SHA-256 of the escaped, joined vary-on values.
pub fn vary_on_digest<S: AsRef<str>>(vary_on: &[S]) -> String {
    let joined = vary_on
        .iter()
        .map(|value| urlencoding::encode(value.as_ref()))
        .collect::<Vec<_>>()
        .join(VARY_ON_SEPARATOR);
    hex::encode(Sha256::digest(joined.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const EMPTY_DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_known_key_format() {
        let key = make_template_fragment_key("sidebar", &["en", "home"]);
        assert_eq!(
            key.as_str(),
            "template.cache.sidebar.e41d6fbfc85e5380fedaa69e2839d8482a17a0e47a34dd783b69542e0416cb81"
        );
        assert_eq!(key.digest().len(), 64);
    }

    #[test]
    fn test_no_vary_on_hashes_empty_string() {
        let key = make_template_fragment_key::<&str>("footer", &[]);
        assert_eq!(key.as_str(), format!("template.cache.footer.{EMPTY_DIGEST}"));
    }

    #[test]
    fn test_empty_list_and_single_empty_value_share_a_key() {
        let none = make_template_fragment_key::<&str>("n", &[]);
        let blank = make_template_fragment_key("n", &[""]);
        assert_eq!(none, blank);
        assert_eq!(blank.digest(), EMPTY_DIGEST);

        // a second empty value adds a separator
        assert_ne!(blank, make_template_fragment_key("n", &["", ""]));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let first = FragmentKey::new("nav", vec!["en".into(), "42".into()]).unwrap();
        let second = FragmentKey::new("nav", vec!["en".into(), "42".into()]).unwrap();
        assert_eq!(first.cache_key(), second.cache_key());
        assert_eq!(first.cache_key(), first.cache_key());
    }

    #[test]
    fn test_separator_in_value_does_not_collide() {
        let left = make_template_fragment_key("x", &["a:b", "c"]);
        let right = make_template_fragment_key("x", &["a", "b:c"]);
        assert_ne!(left, right);
        assert_eq!(
            left.digest(),
            "76f1c2de1d30d9a75ba87a9364450e6376039df43d4f208460fc493a7a2112d5"
        );
        assert_eq!(
            right.digest(),
            "12fbb4b33cc7aff8a39d643f9db37a124bf8a8fa0ce96920027901b92fffa7a4"
        );
    }

    #[test]
    fn test_non_ascii_values_are_escaped_before_hashing() {
        let key = make_template_fragment_key("x", &["hello world", "ü"]);
        assert_eq!(
            key.digest(),
            "613743ecc45379160df46cc877982592cf47e8d19c2081c5ea7e833457b588d7"
        );
    }

    #[test]
    fn test_every_change_alters_the_key() {
        let variants: Vec<CacheKey> = vec![
            make_template_fragment_key("card", &["en", "home"]),
            make_template_fragment_key("card", &["en", "cart"]),
            make_template_fragment_key("card", &["fr", "home"]),
            make_template_fragment_key("card", &["home", "en"]),
            make_template_fragment_key("card", &["en"]),
            make_template_fragment_key("card", &["en", "home", ""]),
            make_template_fragment_key("card", &["enhome"]),
            make_template_fragment_key("tile", &["en", "home"]),
        ];
        let unique: HashSet<&CacheKey> = variants.iter().collect();
        assert_eq!(unique.len(), variants.len());
    }

    #[test]
    fn test_empty_fragment_name_rejected() {
        assert_eq!(
            FragmentKey::new("", vec![]).unwrap_err(),
            ConfigurationError::EmptyFragmentName
        );
    }

    #[test]
    fn test_cache_key_serializes_as_string() {
        let key = make_template_fragment_key::<&str>("footer", &[]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"template.cache.footer.{EMPTY_DIGEST}\""));
    }
}
