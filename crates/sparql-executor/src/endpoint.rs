//! Upstream SPARQL endpoint access

use crate::config::EndpointConfig;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use sparql_core::{Result, SparqlError, SparqlResults};
use std::error::Error as _;
use std::fmt::Debug;
use tracing::debug;

/// Prefer the SPARQL results media type, accept plain JSON from endpoints
/// that only negotiate that
pub const ACCEPT_RESULTS: &str = "application/sparql-results+json, application/json;q=0.9";

/// Longest slice of an error body kept in an `EndpointError`
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Something that answers SPARQL queries with a JSON results document
#[async_trait]
pub trait SparqlEndpoint: Send + Sync + Debug {
    async fn query(&self, query: &str) -> Result<Value>;

    /// Where queries go, for diagnostics
    fn url(&self) -> &str;
}

/// SPARQL 1.1 protocol client over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpSparqlEndpoint {
    client: Client,
    config: EndpointConfig,
}

impl HttpSparqlEndpoint {
    pub fn new(config: EndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SparqlError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    fn request(&self, query: &str) -> RequestBuilder {
        let get_len = self.config.url.len() + "?query=".len() + encoded_len(query);
        let builder = if get_len <= self.config.max_get_url_len {
            self.client.get(&self.config.url).query(&[("query", query)])
        } else {
            debug!(url_len = get_len, "Query too long for GET, using POST");
            self.client.post(&self.config.url).form(&[("query", query)])
        };
        builder.header(ACCEPT, ACCEPT_RESULTS)
    }

    async fn read_results(&self, response: Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SparqlError::endpoint_status(
                status.as_u16(),
                truncate(body.trim(), MAX_ERROR_BODY_CHARS),
            ));
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            debug!(content_type = ?content_type, "Endpoint responded");
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        let value: Value = serde_json::from_str(&body).map_err(|e| {
            SparqlError::endpoint(format!(
                "malformed response ({}): {}",
                e,
                truncate(body.trim(), MAX_ERROR_BODY_CHARS)
            ))
        })?;

        SparqlResults::from_value(&value)?;
        Ok(value)
    }

    fn transport_error(&self, err: reqwest::Error) -> SparqlError {
        if err.is_timeout() {
            SparqlError::Timeout(self.config.timeout)
        } else if err.is_builder() {
            SparqlError::Config(format!("invalid endpoint request: {}", error_chain(&err)))
        } else {
            SparqlError::NetworkError(error_chain(&err))
        }
    }
}

#[async_trait]
impl SparqlEndpoint for HttpSparqlEndpoint {
    async fn query(&self, query: &str) -> Result<Value> {
        let response = self
            .request(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.read_results(response).await
    }

    fn url(&self) -> &str {
        &self.config.url
    }
}

/// Length of `value` once percent-encoded as a query parameter
fn encoded_len(value: &str) -> usize {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b' ' => 1,
            _ => 3,
        })
        .sum()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((at, _)) => format!("{}...", &text[..at]),
        None => text.to_string(),
    }
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
