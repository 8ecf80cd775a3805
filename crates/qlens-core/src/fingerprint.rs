//! Query fingerprints
//!
//! A fingerprint identifies a query *shape*: two statements that differ only
//! in literal values, comments, keyword case or whitespace normalize to the
//! same text and therefore share a fingerprint.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use ring::digest::{SHA256, digest};
use serde::{Deserialize, Serialize};

static COMMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--[^\n]*|/\*[\s\S]*?\*/").expect("valid regex"));

static STRING_LITERAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("valid regex"));

static NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\d+|\b\d+(?:\.\d+)?\b").expect("valid regex"));

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Number of digest bytes kept in a fingerprint
const FINGERPRINT_BYTES: usize = 16;

/// Normalizes query text into its shape.
///
/// Comments are dropped, string and numeric literals become `?`, the text is
/// lower-cased, whitespace is collapsed and a trailing `;` is removed.
///
/// # Example
///
/// ```
/// use qlens_core::normalize_query;
///
/// assert_eq!(
///     normalize_query("SELECT *  FROM users WHERE id = 42;"),
///     "select * from users where id = ?"
/// );
/// ```
pub fn normalize_query(text: &str) -> String {
    let without_comments = COMMENT_REGEX.replace_all(text, " ");
    let without_strings = STRING_LITERAL_REGEX.replace_all(&without_comments, "?");
    let without_numbers = NUMBER_REGEX.replace_all(&without_strings, "?");
    let lowered = without_numbers.to_lowercase();
    let collapsed = WHITESPACE_REGEX.replace_all(&lowered, " ");

    collapsed.trim().trim_end_matches(';').trim_end().to_string()
}

/// Stable identifier for a normalized query shape
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of raw query text
    pub fn of(text: &str) -> Self {
        Self::of_normalized(&normalize_query(text))
    }

    /// Computes the fingerprint of text that is already normalized
    pub fn of_normalized(normalized: &str) -> Self {
        let hash = digest(&SHA256, normalized.as_bytes());
        Self(hex::encode(&hash.as_ref()[..FINGERPRINT_BYTES]))
    }

    /// Wraps an existing fingerprint string (e.g. read back from a report)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines and tables
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_replaces_literals() {
        assert_eq!(
            normalize_query("SELECT name FROM users WHERE email = 'a@b.com' AND age > 30"),
            "select name from users where email = ? and age > ?"
        );
    }

    #[test]
    fn test_normalize_keeps_identifier_digits() {
        assert_eq!(
            normalize_query("select c1 from t2 where c1 = $1"),
            "select c1 from t2 where c1 = ?"
        );
    }

    #[test]
    fn test_normalize_strips_comments_and_whitespace() {
        assert_eq!(
            normalize_query("  SELECT /* hint */ id\n\tFROM   orders -- trailing\n ;"),
            "select id from orders"
        );
    }

    #[test]
    fn test_normalize_escaped_quotes() {
        assert_eq!(
            normalize_query("SELECT 1 FROM t WHERE name = 'O''Brien'"),
            "select ? from t where name = ?"
        );
    }

    #[test]
    fn test_same_shape_same_fingerprint() {
        let a = Fingerprint::of("SELECT * FROM orders WHERE id = 1");
        let b = Fingerprint::of("select *   from ORDERS where id = 99;");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), FINGERPRINT_BYTES * 2);
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn test_different_shape_different_fingerprint() {
        let a = Fingerprint::of("SELECT * FROM orders WHERE id = 1");
        let b = Fingerprint::of("SELECT * FROM orders WHERE customer_id = 1");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_serializes_as_string() {
        let fp = Fingerprint::from_hex("abcdef0123456789");
        assert_eq!(serde_json::to_string(&fp).unwrap(), "\"abcdef0123456789\"");
        assert_eq!(fp.to_string(), "abcdef0123456789");
    }
}
