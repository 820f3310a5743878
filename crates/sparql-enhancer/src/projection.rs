//! Text-level helpers for locating the projection clause and the outermost
//! group pattern. These scan raw query text; they are not a SPARQL parser.

use regex::Regex;
use std::sync::LazyLock;

static PROJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bSELECT\b\s*(?:DISTINCT\b|REDUCED\b)?(.*?)(?:\bWHERE\b|\{)")
        .expect("projection pattern is valid")
});

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?$](\w+)").expect("variable pattern is valid"));

/// Projection clause text and the byte offset where it ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection<'a> {
    pub clause: &'a str,
    /// Offset just past the projection, at `WHERE` or the opening brace
    pub end: usize,
}

/// Locate the first `SELECT` projection clause
pub fn find_projection(query: &str) -> Option<Projection<'_>> {
    let captures = PROJECTION.captures(query)?;
    let clause = captures.get(1)?;
    Some(Projection {
        clause: clause.as_str(),
        end: clause.end(),
    })
}

/// Variables named in `clause`, in order of first appearance, without duplicates
pub fn projected_variables(clause: &str) -> Vec<String> {
    let mut vars: Vec<String> = Vec::new();
    for caps in VARIABLE.captures_iter(clause) {
        let name = &caps[1];
        if !vars.iter().any(|v| v == name) {
            vars.push(name.to_string());
        }
    }
    vars
}

/// Byte offsets of the opening and matching closing brace of the first
/// group pattern starting at or after `from`.
///
/// Braces inside string literals, IRIs and comments are ignored.
pub fn outermost_group(query: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = query.as_bytes();
    let mut i = from;
    let mut depth = 0usize;
    let mut open = None;

    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                i = skip_comment(bytes, i);
                continue;
            }
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'<' => {
                if let Some(end) = iri_end(bytes, i) {
                    i = end + 1;
                    continue;
                }
            }
            b'{' => {
                if open.is_none() {
                    open = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if open.is_some() {
                    depth -= 1;
                    if depth == 0 {
                        return open.map(|o| (o, i));
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| start + p + 1)
        .unwrap_or(bytes.len())
}

/// Index just past the literal starting at `start`, long-quoted forms included
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let long = bytes.len() >= start + 3 && bytes[start + 1] == quote && bytes[start + 2] == quote;
    let mut i = if long { start + 3 } else { start + 1 };

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => {
                if !long {
                    return i + 1;
                }
                if bytes.len() >= i + 3 && bytes[i + 1] == quote && bytes[i + 2] == quote {
                    return i + 3;
                }
                i += 1;
            }
            b'\n' if !long => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// End of an IRI reference `<...>` starting at `start`; `None` for a comparison operator
fn iri_end(bytes: &[u8], start: usize) -> Option<usize> {
    for (offset, &b) in bytes[start + 1..].iter().enumerate() {
        match b {
            b'>' => return (offset > 0).then_some(start + 1 + offset),
            b if b.is_ascii_whitespace() || b == b'<' || b == b'"' || b == b'{' || b == b'}' => {
                return None
            }
            _ => {}
        }
    }
    None
}
