//! Cache key definitions.
//!
//! A request path maps to a flat [`CacheKey`] shared by both cache tiers.

use std::borrow::Borrow;
use std::fmt;

/// Character substituted for path separators and whitespace.
pub const KEY_SUBSTITUTE: char = '_';

/// Normalized cache key.
///
/// Paths that differ only in separator or whitespace placement collapse to the
/// same key and therefore share one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap a string that is already in normalized form.
    ///
    /// The value is normalized again, so arbitrary input is accepted.
    pub fn from_normalized(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.chars().any(is_replaced) {
            normalize(&value)
        } else {
            Self(value)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Plain substring containment, as used by pattern invalidation.
    pub fn contains(&self, needle: &str) -> bool {
        self.0.contains(needle)
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

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

fn is_replaced(ch: char) -> bool {
    ch == '/' || ch.is_whitespace()
}

/// Map a request path to its cache key.
///
/// Every `/` and every whitespace character becomes `_`. Total and idempotent.
pub fn normalize(path: &str) -> CacheKey {
    CacheKey(
        path.chars()
            .map(|ch| if is_replaced(ch) { KEY_SUBSTITUTE } else { ch })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_and_whitespace_become_underscores() {
        assert_eq!(normalize("/foo/bar").as_str(), "_foo_bar");
        assert_eq!(normalize("/a b\tc\nd").as_str(), "_a_b_c_d");
        assert_eq!(normalize("/posts/hello?page=2").as_str(), "_posts_hello?page=2");
    }

    #[test]
    fn empty_path_is_empty_key() {
        assert_eq!(normalize("").as_str(), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "",
            "/",
            "//double//slash",
            "  padded  ",
            "/unicode/\u{3000}wide space",
            "already_normal",
            "/mixed/_under_/scores",
        ];

        for input in inputs {
            let once = normalize(input);
            let twice = normalize(once.as_str());
            assert_eq!(once, twice, "input {input:?}");
        }
    }

    #[test]
    fn colliding_paths_share_a_key() {
        assert_eq!(normalize("/a/b"), normalize("/a b"));
        assert_eq!(normalize("/a/b"), normalize("_a_b"));
    }

    #[test]
    fn from_normalized_keeps_keys_stable() {
        assert_eq!(CacheKey::from_normalized("_foo_bar"), normalize("/foo/bar"));
        assert_eq!(CacheKey::from_normalized("/foo/bar"), normalize("/foo/bar"));
    }
}
