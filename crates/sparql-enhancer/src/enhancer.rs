//! Label-resolution rewriting
//!
//! Entity variables in the projection get an optional label-service block so
//! the endpoint returns a human-readable `?<var>Label` next to each IRI.

use crate::classify::{default_rules, is_label_output, ClassificationRule, QueryFacts};
use crate::projection::{find_projection, outermost_group, projected_variables};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

pub const DEFAULT_LABEL_LANGUAGE: &str = "en";

static LANGUAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"wikibase:language\s+"([^"]*)""#).expect("language pattern is valid")
});

/// What `enhance` would do to a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEnhancementPlan {
    pub projected_variables: Vec<String>,
    /// Variables that will receive a label block, in projection order
    pub entity_variables: Vec<String>,
    pub language: String,
}

impl QueryEnhancementPlan {
    pub fn is_noop(&self) -> bool {
        self.entity_variables.is_empty()
    }
}

pub struct QueryEnhancer {
    default_language: String,
    rules: Vec<Box<dyn ClassificationRule>>,
}

impl QueryEnhancer {
    pub fn new() -> Self {
        Self {
            default_language: DEFAULT_LABEL_LANGUAGE.to_string(),
            rules: default_rules(),
        }
    }

    /// Language used when the query does not already name one
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        if !language.trim().is_empty() {
            self.default_language = language.trim().to_string();
        }
        self
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn plan(&self, query: &str) -> QueryEnhancementPlan {
        let language = self.language_for(query);

        let Some(projection) = find_projection(query) else {
            return QueryEnhancementPlan {
                projected_variables: Vec::new(),
                entity_variables: Vec::new(),
                language,
            };
        };

        let projected = projected_variables(projection.clause);
        let facts = QueryFacts::scan(query);
        let entity_variables = projected
            .iter()
            .filter(|var| !is_label_output(var) && !facts.has_label_binding(var))
            .filter(|var| self.classify(var, &facts))
            .cloned()
            .collect();

        QueryEnhancementPlan {
            projected_variables: projected,
            entity_variables,
            language,
        }
    }

    /// Rewrite `query` with label blocks for its entity variables.
    ///
    /// Returns the input unchanged when there is nothing to add or no place
    /// to add it.
    pub fn enhance(&self, query: &str) -> String {
        let plan = self.plan(query);
        if plan.is_noop() {
            debug!("No entity variables to label");
            return query.to_string();
        }

        let Some(insert_at) = find_projection(query)
            .and_then(|projection| outermost_group(query, projection.end))
            .map(|(_, close)| close)
        else {
            debug!("No group pattern found, leaving query unchanged");
            return query.to_string();
        };

        let mut blocks = String::new();
        for var in &plan.entity_variables {
            blocks.push_str(&label_block(var, &plan.language));
        }

        let mut enhanced = String::with_capacity(query.len() + blocks.len());
        enhanced.push_str(&query[..insert_at]);
        enhanced.push_str(&blocks);
        enhanced.push_str(&query[insert_at..]);

        debug!(
            variables = ?plan.entity_variables,
            language = %plan.language,
            "Added label resolution"
        );
        enhanced
    }

    fn classify(&self, variable: &str, facts: &QueryFacts) -> bool {
        match self.rules.iter().find(|rule| rule.matches(variable, facts)) {
            Some(rule) => {
                debug!(variable, rule = rule.name(), "Entity variable");
                true
            }
            None => false,
        }
    }

    fn language_for(&self, query: &str) -> String {
        LANGUAGE
            .captures(query)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|lang| !lang.trim().is_empty())
            .unwrap_or_else(|| self.default_language.clone())
    }
}

impl Default for QueryEnhancer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryEnhancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rules: Vec<_> = self.rules.iter().map(|rule| rule.name()).collect();
        f.debug_struct("QueryEnhancer")
            .field("default_language", &self.default_language)
            .field("rules", &rules)
            .finish()
    }
}

fn label_block(var: &str, language: &str) -> String {
    format!(
        "  OPTIONAL {{\n    FILTER(ISIRI(?{var}))\n    SERVICE wikibase:label {{ bd:serviceParam wikibase:language \"{language}\". ?{var} rdfs:label ?{var}Label . }}\n  }}\n"
    )
}
