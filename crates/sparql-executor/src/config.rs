//! Endpoint and executor configuration

use crate::guard::DEFAULT_ALLOWED_FORMS;
use sparql_enhancer::DEFAULT_LABEL_LANGUAGE;
use std::time::Duration;

pub const DEFAULT_ENDPOINT_URL: &str = "https://query.wikidata.org/sparql";
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(20);
/// Longest GET URL sent before switching to a form-encoded POST
pub const DEFAULT_MAX_GET_URL_LEN: usize = 2048;

pub fn default_user_agent() -> String {
    format!("sparql-cache-engine/{}", env!("CARGO_PKG_VERSION"))
}

/// Connection settings for an HTTP SPARQL endpoint
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub url: String,
    /// Per-request timeout enforced by the HTTP client
    pub timeout: Duration,
    pub user_agent: String,
    pub max_get_url_len: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT_URL.to_string(),
            timeout: DEFAULT_QUERY_TIMEOUT,
            user_agent: default_user_agent(),
            max_get_url_len: DEFAULT_MAX_GET_URL_LEN,
        }
    }
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_get_url_len(mut self, len: usize) -> Self {
        self.max_get_url_len = len;
        self
    }
}

/// Behaviour of the execution pipeline
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Hard wall-clock deadline for a dispatched query
    pub timeout: Duration,
    /// Add label-resolution blocks before dispatch
    pub enhance_queries: bool,
    /// Reject anything that is not one of `allowed_forms`
    pub read_only: bool,
    pub allowed_forms: Vec<String>,
    /// Label language used when a query does not name one
    pub label_language: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_QUERY_TIMEOUT,
            enhance_queries: true,
            read_only: true,
            allowed_forms: DEFAULT_ALLOWED_FORMS.iter().map(|f| f.to_string()).collect(),
            label_language: DEFAULT_LABEL_LANGUAGE.to_string(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_enhancement(mut self, enabled: bool) -> Self {
        self.enhance_queries = enabled;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_allowed_forms<I, S>(mut self, forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_forms = forms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label_language(mut self, language: impl Into<String>) -> Self {
        self.label_language = language.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let endpoint = EndpointConfig::default();
        assert_eq!(endpoint.url, DEFAULT_ENDPOINT_URL);
        assert_eq!(endpoint.timeout, Duration::from_secs(20));
        assert!(endpoint.user_agent.starts_with("sparql-cache-engine/"));

        let executor = ExecutorConfig::default();
        assert_eq!(executor.timeout, Duration::from_secs(20));
        assert!(executor.enhance_queries);
        assert!(executor.read_only);
        assert_eq!(executor.allowed_forms, vec!["SELECT", "ASK"]);
        assert_eq!(executor.label_language, "en");
    }

    #[test]
    fn test_builders() {
        let endpoint = EndpointConfig::new("http://localhost:3030/ds/sparql")
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("test/1.0")
            .with_max_get_url_len(100);
        assert_eq!(endpoint.url, "http://localhost:3030/ds/sparql");
        assert_eq!(endpoint.timeout, Duration::from_secs(5));
        assert_eq!(endpoint.user_agent, "test/1.0");
        assert_eq!(endpoint.max_get_url_len, 100);

        let executor = ExecutorConfig::default()
            .with_timeout(Duration::from_millis(500))
            .with_enhancement(false)
            .with_read_only(false)
            .with_allowed_forms(["SELECT"])
            .with_label_language("fr");
        assert_eq!(executor.timeout, Duration::from_millis(500));
        assert!(!executor.enhance_queries);
        assert!(!executor.read_only);
        assert_eq!(executor.allowed_forms, vec!["SELECT"]);
        assert_eq!(executor.label_language, "fr");
    }
}
