//! Cache key derivation
//!
//! Queries that differ only in whitespace or letter case map to the same key.
//! String literals are case-folded too; SPARQL keywords are case-insensitive,
//! literal contents are not, and this is accepted as an approximation.

use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix that namespaces every key derived from a query
pub const KEY_PREFIX: &str = "sparql_";

/// Number of hex characters of the digest kept in the key
pub const KEY_DIGEST_LEN: usize = 16;

/// Key for cache lookups, derived from the normalized query text
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a raw query string
    pub fn from_query(query: &str) -> Self {
        let normalized = normalize_query(query);
        let digest = Sha256::digest(normalized.as_bytes());
        let hex = hex::encode(digest);
        Self(format!("{}{}", KEY_PREFIX, &hex[..KEY_DIGEST_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
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

/// Trim, collapse whitespace runs to a single space and lower-case
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Shorthand for [`CacheKey::from_query`]
pub fn derive_key(query: &str) -> CacheKey {
    CacheKey::from_query(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive() {
        let a = derive_key("SELECT ?x WHERE { ?x wdt:P31 wd:Q5 }");
        let b = derive_key("select ?x where { ?x wdt:P31 wd:Q5 }");
        assert_eq!(a, b);
    }

    #[test]
    fn test_whitespace_insensitive() {
        let a = derive_key("SELECT ?x WHERE { ?x wdt:P31 wd:Q5 }");
        let b = derive_key("  SELECT ?x\n\tWHERE {\n    ?x   wdt:P31 wd:Q5\n}  \n");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_queries_differ() {
        let a = derive_key("SELECT ?x WHERE { ?x wdt:P31 wd:Q5 }");
        let b = derive_key("SELECT ?x WHERE { ?x wdt:P31 wd:Q6 }");
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_shape() {
        let key = derive_key("SELECT * WHERE { ?s ?p ?o }");
        assert!(key.as_str().starts_with(KEY_PREFIX));
        assert_eq!(key.as_str().len(), KEY_PREFIX.len() + KEY_DIGEST_LEN);
        assert!(key.as_str()[KEY_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_empty_query() {
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb924...
        assert_eq!(derive_key("").as_str(), "sparql_e3b0c44298fc1c14");
        assert_eq!(derive_key("   \n\t ").as_str(), "sparql_e3b0c44298fc1c14");
    }

    #[test]
    fn test_stable_across_calls() {
        let query = "SELECT ?item WHERE { ?item wdt:P31 wd:Q146 } LIMIT 10";
        let first = derive_key(query);
        for _ in 0..5 {
            assert_eq!(derive_key(query), first);
        }
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(
            normalize_query("  SELECT  ?x\nWHERE {  ?x ?p ?o }  "),
            "select ?x where { ?x ?p ?o }"
        );
    }
}
