//! Read-only query guard

use sparql_core::{Result, SparqlError};

pub const DEFAULT_ALLOWED_FORMS: &[&str] = &["SELECT", "ASK"];

/// Rejects queries whose form is not on an allow-list
#[derive(Debug, Clone)]
pub struct ReadOnlyGuard {
    allowed: Vec<String>,
}

impl ReadOnlyGuard {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|form| form.as_ref().trim().to_ascii_uppercase())
                .filter(|form| !form.is_empty())
                .collect(),
        }
    }

    pub fn allowed_forms(&self) -> &[String] {
        &self.allowed
    }

    pub fn check(&self, query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(SparqlError::InvalidInput("query is empty".into()));
        }

        match query_form(query) {
            Some(form) if self.allowed.iter().any(|allowed| *allowed == form) => Ok(()),
            Some(form) => Err(SparqlError::InvalidInput(format!(
                "{} is not allowed; permitted query forms: {}",
                form,
                self.allowed.join(", ")
            ))),
            None => Err(SparqlError::InvalidInput(
                "could not determine the query form".into(),
            )),
        }
    }
}

impl Default for ReadOnlyGuard {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_FORMS)
    }
}

/// First keyword of the query after the prologue, upper-cased.
///
/// Skips comments together with `PREFIX` and `BASE` declarations. Returns
/// `None` when the prologue is malformed or no keyword follows it.
pub fn query_form(query: &str) -> Option<String> {
    let bytes = query.as_bytes();
    let mut i = 0;

    loop {
        i = skip_trivia(bytes, i);
        let end = word_end(bytes, i);
        if end == i {
            return None;
        }
        let word = query[i..end].to_ascii_uppercase();
        i = end;

        match word.as_str() {
            "PREFIX" => {
                i = skip_trivia(bytes, i);
                while i < bytes.len() && bytes[i] != b':' && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if bytes.get(i) != Some(&b':') {
                    return None;
                }
                i = skip_iri(bytes, i + 1)?;
            }
            "BASE" => i = skip_iri(bytes, i)?,
            _ => return Some(word),
        }
    }
}

fn skip_trivia(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => break,
        }
    }
    i
}

fn word_end(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    i
}

fn skip_iri(bytes: &[u8], i: usize) -> Option<usize> {
    let i = skip_trivia(bytes, i);
    if bytes.get(i) != Some(&b'<') {
        return None;
    }
    let close = bytes[i..].iter().position(|&b| b == b'>')?;
    Some(i + close + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparql_core::FailureKind;

    #[test]
    fn test_query_form() {
        assert_eq!(query_form("SELECT ?x WHERE {}").as_deref(), Some("SELECT"));
        assert_eq!(query_form("  ask { ?s ?p ?o }").as_deref(), Some("ASK"));
        assert_eq!(query_form("").as_deref(), None);
        assert_eq!(query_form("?x").as_deref(), None);
    }

    #[test]
    fn test_query_form_skips_prologue() {
        let query = "# people\nPREFIX wd: <http://www.wikidata.org/entity/>\n\
                     PREFIX wdt:<http://www.wikidata.org/prop/direct/>\n\
                     BASE <http://example.org/>\n\
                     SELECT ?x WHERE { ?x wdt:P31 wd:Q5 }";
        assert_eq!(query_form(query).as_deref(), Some("SELECT"));

        let default_prefix = "PREFIX : <http://example.org/> select * { ?s ?p ?o }";
        assert_eq!(query_form(default_prefix).as_deref(), Some("SELECT"));
    }

    #[test]
    fn test_malformed_prologue() {
        assert_eq!(query_form("PREFIX wd <http://x/> SELECT *"), None);
        assert_eq!(query_form("BASE SELECT *"), None);
        assert_eq!(query_form("PREFIX wd: <http://x/"), None);
    }

    #[test]
    fn test_guard_allows_read_forms() {
        let guard = ReadOnlyGuard::default();
        assert!(guard.check("SELECT ?x WHERE { ?x ?p ?o }").is_ok());
        assert!(guard.check("PREFIX wd: <http://x/> ASK { wd:Q1 ?p ?o }").is_ok());
    }

    #[test]
    fn test_guard_rejects_updates_and_empty() {
        let guard = ReadOnlyGuard::default();
        for query in [
            "",
            "   \n ",
            "INSERT DATA { <a> <b> <c> }",
            "PREFIX ex: <http://x/> DELETE WHERE { ?s ?p ?o }",
            "DROP ALL",
            "LOAD <http://example.org/data.ttl>",
            "CONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }",
        ] {
            let err = guard.check(query).unwrap_err();
            assert_eq!(err.kind(), FailureKind::InvalidInput, "query: {query:?}");
        }
    }

    #[test]
    fn test_custom_allow_list() {
        let guard = ReadOnlyGuard::new(["select", " construct ", ""]);
        assert_eq!(guard.allowed_forms(), &["SELECT", "CONSTRUCT"]);
        assert!(guard.check("CONSTRUCT WHERE { ?s ?p ?o }").is_ok());
        assert!(guard.check("ASK { ?s ?p ?o }").is_err());
    }
}
