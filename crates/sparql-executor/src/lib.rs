//! Query execution
//!
//! Runs a query through the cache-first pipeline: read-only guard, key
//! derivation, cache lookup, label enhancement, deadline-bounded dispatch to
//! the endpoint and caching of successful results.

pub mod config;
pub mod endpoint;
pub mod executor;
pub mod guard;

pub use config::{EndpointConfig, ExecutorConfig};
pub use endpoint::{HttpSparqlEndpoint, SparqlEndpoint};
pub use executor::CachedSparqlExecutor;
pub use guard::{query_form, ReadOnlyGuard, DEFAULT_ALLOWED_FORMS};
