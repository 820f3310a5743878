use crate::error::{FailureKind, Result, SparqlError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// SPARQL 1.1 JSON results document (`application/sparql-results+json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparqlResults {
    pub head: ResultsHead,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultBindings>,
    /// Present instead of `results` for ASK queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsHead {
    #[serde(default)]
    pub vars: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultBindings {
    #[serde(default)]
    pub bindings: Vec<BTreeMap<String, RdfTerm>>,
}

/// A single bound value in a result row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdfTerm {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl RdfTerm {
    pub fn is_iri(&self) -> bool {
        self.kind == "uri"
    }
}

impl SparqlResults {
    /// Validate and decode a raw results document.
    ///
    /// A document is well-formed when it carries a `head` object and either
    /// a `results` or a `boolean` member.
    pub fn from_value(value: &Value) -> Result<Self> {
        let parsed: SparqlResults = serde_json::from_value(value.clone())
            .map_err(|e| SparqlError::endpoint(format!("malformed results document: {}", e)))?;
        if parsed.results.is_none() && parsed.boolean.is_none() {
            return Err(SparqlError::endpoint(
                "malformed results document: neither `results` nor `boolean` present",
            ));
        }
        Ok(parsed)
    }

    /// Variable names from the header
    pub fn variables(&self) -> &[String] {
        &self.head.vars
    }

    pub fn bindings(&self) -> &[BTreeMap<String, RdfTerm>] {
        self.results
            .as_ref()
            .map(|r| r.bindings.as_slice())
            .unwrap_or(&[])
    }

    pub fn row_count(&self) -> usize {
        self.bindings().len()
    }

    /// Rows as plain strings in header order; unbound cells are empty
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.bindings()
            .iter()
            .map(|binding| {
                self.head
                    .vars
                    .iter()
                    .map(|var| {
                        binding
                            .get(var)
                            .map(|term| term.value.clone())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect()
    }
}

/// States of a single execution. Terminal states end the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    Idle,
    KeyDerived,
    CacheChecked,
    CacheHit,
    Enhancing,
    Dispatched,
    Succeeded,
    TimedOut,
    NetworkFailed,
    EndpointRejected,
    /// Refused by the read-only guard before a key was derived
    Rejected,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::CacheHit
                | ExecutionState::Succeeded
                | ExecutionState::TimedOut
                | ExecutionState::NetworkFailed
                | ExecutionState::EndpointRejected
                | ExecutionState::Rejected
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of running one query through the engine
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Served from the cache without contacting the endpoint
    Hit(Value),
    /// Cache miss, executed against the endpoint and cached
    Success(Value),
    Failure(SparqlError),
}

impl ExecutionOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, ExecutionOutcome::Hit(_))
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, ExecutionOutcome::Failure(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            ExecutionOutcome::Hit(payload) | ExecutionOutcome::Success(payload) => Some(payload),
            ExecutionOutcome::Failure(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ExecutionOutcome::Failure(err) => Some(err.kind()),
            _ => None,
        }
    }

    pub fn terminal_state(&self) -> ExecutionState {
        match self {
            ExecutionOutcome::Hit(_) => ExecutionState::CacheHit,
            ExecutionOutcome::Success(_) => ExecutionState::Succeeded,
            ExecutionOutcome::Failure(err) => match err.kind() {
                FailureKind::Timeout => ExecutionState::TimedOut,
                FailureKind::NetworkError => ExecutionState::NetworkFailed,
                FailureKind::EndpointError => ExecutionState::EndpointRejected,
                // The executor does not surface the remaining kinds from a dispatch
                _ => ExecutionState::Rejected,
            },
        }
    }

    pub fn into_result(self) -> Result<Value> {
        match self {
            ExecutionOutcome::Hit(payload) | ExecutionOutcome::Success(payload) => Ok(payload),
            ExecutionOutcome::Failure(err) => Err(err),
        }
    }
}
