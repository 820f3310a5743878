//! Entity-variable classification rules
//!
//! The query text is scanned once into [`QueryFacts`] and each rule is a
//! predicate over those facts. A variable is an entity variable as soon as
//! one rule matches. Misclassification is harmless: a missed variable simply
//! gets no label block, and a spurious block is an OPTIONAL that binds
//! nothing.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Names that suggest a variable holds an entity
pub const ENTITY_NAME_HINTS: &[&str] = &["entity", "item", "property", "subject", "object"];

/// Suffixes produced by the label service; such variables are already labels
pub const LABEL_SUFFIXES: &[&str] = &["Label", "AltLabel", "Description"];

/// `?v wdt:P31 ...`
static DIRECT_SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[?$](\w+)\s+wdt:P\d+\b").expect("direct subject pattern is valid")
});

/// `... wdt:P31 ?v`
static DIRECT_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"wdt:P\d+\s+[?$](\w+)\b").expect("direct object pattern is valid")
});

/// Subject of a predicate that only things with a label carry
static LABEL_SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[?$](\w+)\s+(?:rdfs:label|skos:altLabel|skos:prefLabel|schema:description|schema:name)")
        .expect("label subject pattern is valid")
});

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?$](\w+)").expect("variable pattern is valid"));

/// Variable roles found in one query
#[derive(Debug, Default)]
pub(crate) struct QueryFacts {
    direct_subjects: HashSet<String>,
    direct_objects: HashSet<String>,
    label_subjects: HashSet<String>,
    variables: HashSet<String>,
}

impl QueryFacts {
    pub(crate) fn scan(query: &str) -> Self {
        let collect = |re: &Regex| -> HashSet<String> {
            re.captures_iter(query)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .collect()
        };

        Self {
            direct_subjects: collect(&DIRECT_SUBJECT),
            direct_objects: collect(&DIRECT_OBJECT),
            label_subjects: collect(&LABEL_SUBJECT),
            variables: collect(&VARIABLE),
        }
    }

    /// Whether `?<variable>Label` occurs anywhere in the query
    pub(crate) fn has_label_binding(&self, variable: &str) -> bool {
        self.variables.contains(&format!("{variable}Label"))
    }
}

pub(crate) trait ClassificationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, variable: &str, facts: &QueryFacts) -> bool;
}

pub(crate) struct DirectPropertySubject;

impl ClassificationRule for DirectPropertySubject {
    fn name(&self) -> &'static str {
        "direct-property subject"
    }

    fn matches(&self, variable: &str, facts: &QueryFacts) -> bool {
        facts.direct_subjects.contains(variable)
    }
}

pub(crate) struct DirectPropertyObject;

impl ClassificationRule for DirectPropertyObject {
    fn name(&self) -> &'static str {
        "direct-property object"
    }

    fn matches(&self, variable: &str, facts: &QueryFacts) -> bool {
        facts.direct_objects.contains(variable)
    }
}

/// `?v rdfs:label ...`
pub(crate) struct LabelSubject;

impl ClassificationRule for LabelSubject {
    fn name(&self) -> &'static str {
        "label subject"
    }

    fn matches(&self, variable: &str, facts: &QueryFacts) -> bool {
        facts.label_subjects.contains(variable)
    }
}

/// `?item`, `?subjectEntity`, ...
pub(crate) struct SuggestiveName;

impl ClassificationRule for SuggestiveName {
    fn name(&self) -> &'static str {
        "entity-like name"
    }

    fn matches(&self, variable: &str, _facts: &QueryFacts) -> bool {
        let lower = variable.to_lowercase();
        ENTITY_NAME_HINTS.iter().any(|hint| lower.contains(hint))
    }
}

pub(crate) fn default_rules() -> Vec<Box<dyn ClassificationRule>> {
    vec![
        Box::new(DirectPropertySubject),
        Box::new(DirectPropertyObject),
        Box::new(LabelSubject),
        Box::new(SuggestiveName),
    ]
}

/// Whether `variable` is itself a label-service output such as `?itemLabel`
pub fn is_label_output(variable: &str) -> bool {
    LABEL_SUFFIXES
        .iter()
        .any(|suffix| variable.len() > suffix.len() && variable.ends_with(suffix))
}

/// Whether `?<variable>Label` already occurs in the query
pub fn has_label_binding(variable: &str, query: &str) -> bool {
    QueryFacts::scan(query).has_label_binding(variable)
}
