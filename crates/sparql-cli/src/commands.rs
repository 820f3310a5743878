use crate::settings::Settings;
use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Cell, Color, Table as ComfyTable};
use serde_json::Value;
use sparql_cache::{derive_key, normalize_query, open_store, spawn_expiry_sweeper, CacheAdmin, CacheStatsSnapshot, CacheStore};
use sparql_core::{ExecutionOutcome, SparqlResults, SystemClock};
use sparql_enhancer::QueryEnhancer;
use sparql_executor::{CachedSparqlExecutor, HttpSparqlEndpoint};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Opened cache store plus its optional background sweeper
pub struct CacheHandle {
    pub store: Arc<dyn CacheStore>,
    sweeper: Option<JoinHandle<()>>,
}

impl CacheHandle {
    pub fn open(settings: &Settings) -> Result<Self> {
        let config = settings.cache_config();
        let store = open_store(&config, Arc::new(SystemClock))
            .with_context(|| format!("cannot open cache '{}'", config.connection_string))?;
        let sweeper = config
            .sweep_interval
            .map(|interval| spawn_expiry_sweeper(Arc::clone(&store), interval));
        Ok(Self { store, sweeper })
    }
}

impl Drop for CacheHandle {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

/// Load the query text from `--sparql` or `--file`
pub fn read_query(sparql: Option<String>, file: Option<&Path>) -> Result<String> {
    match (sparql, file) {
        (Some(query), _) => Ok(query),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read query file {}", path.display())),
        (None, None) => anyhow::bail!("provide a query with --sparql or --file"),
    }
}

pub async fn run_query(settings: &Settings, query: &str, output: OutputFormat) -> Result<()> {
    let cache = CacheHandle::open(settings)?;
    let endpoint = HttpSparqlEndpoint::new(settings.endpoint_config())?;
    let executor = CachedSparqlExecutor::new(
        Arc::clone(&cache.store),
        Arc::new(endpoint),
        settings.executor_config(),
    );

    println!("{} Executing query against {}", "→".bright_blue(), settings.sparql_endpoint);
    let start = Instant::now();
    let outcome = executor.execute(query).await;
    let elapsed = start.elapsed();

    match outcome {
        ExecutionOutcome::Hit(payload) => {
            println!("{} Served from cache", "✓".bright_green());
            print_results(&payload, output)?;
        }
        ExecutionOutcome::Success(payload) => {
            println!("{} Query executed", "✓".bright_green());
            print_results(&payload, output)?;
        }
        ExecutionOutcome::Failure(err) => {
            eprintln!("{} {}", "✗".bright_red(), err.kind().user_message().bright_red());
            anyhow::bail!(err);
        }
    }

    println!(
        "{} {:.2}ms",
        "Time:".bright_yellow(),
        elapsed.as_secs_f64() * 1000.0
    );
    Ok(())
}

fn print_results(payload: &Value, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(payload)?),
        OutputFormat::Table => {
            let results = SparqlResults::from_value(payload)?;
            if let Some(answer) = results.boolean {
                println!("{}", answer.to_string().bright_cyan());
                return Ok(());
            }

            let mut table = ComfyTable::new();
            table.set_header(
                results
                    .variables()
                    .iter()
                    .map(|var| Cell::new(var).fg(Color::Cyan))
                    .collect::<Vec<_>>(),
            );
            for row in results.rows() {
                table.add_row(row);
            }
            println!("{}", table);
            println!("{} row(s)", results.row_count());
        }
    }
    Ok(())
}

pub fn show_key(query: &str) {
    println!("{} {}", "Normalized:".bright_yellow(), normalize_query(query));
    println!("{} {}", "Key:".bright_yellow(), derive_key(query).as_str().bright_cyan());
}

pub fn show_enhancement(settings: &Settings, query: &str) {
    let enhancer = QueryEnhancer::new().with_default_language(settings.sparql_label_language.clone());
    let plan = enhancer.plan(query);

    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Item").fg(Color::Cyan),
        Cell::new("Value").fg(Color::Green),
    ]);
    table.add_row(vec!["Projected", &plan.projected_variables.join(", ")]);
    table.add_row(vec!["Entity variables", &plan.entity_variables.join(", ")]);
    table.add_row(vec!["Label language", &plan.language]);
    println!("{}", table);

    if plan.is_noop() {
        println!("{}", "Query unchanged".bright_black());
    } else {
        println!();
        println!("{}", enhancer.enhance(query));
    }
}

pub fn show_stats(settings: &Settings, output: OutputFormat) -> Result<()> {
    let cache = CacheHandle::open(settings)?;
    let stats = CacheAdmin::new(Arc::clone(&cache.store)).stats()?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Table => print_stats_table(&stats),
    }
    Ok(())
}

fn print_stats_table(stats: &CacheStatsSnapshot) {
    println!();
    println!("{}", "Result Cache Statistics".bright_yellow().bold());
    println!();

    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Metric").fg(Color::Cyan),
        Cell::new("Value").fg(Color::Green),
    ]);

    table.add_row(vec!["Backend", &stats.backend]);
    table.add_row(vec!["Entries", &stats.entry_count.to_string()]);
    table.add_row(vec!["TTL", &format!("{}s", stats.ttl_seconds)]);
    table.add_row(vec!["Hits", &stats.hits.to_string()]);
    table.add_row(vec!["Misses", &stats.misses.to_string()]);
    table.add_row(vec!["Hit Rate", &format!("{:.1}%", stats.hit_rate * 100.0)]);
    table.add_row(vec!["Writes", &stats.writes.to_string()]);
    table.add_row(vec!["Evictions", &stats.evictions.to_string()]);
    table.add_row(vec!["Expirations", &stats.expirations.to_string()]);

    println!("{}", table);
}

pub fn clear_cache(settings: &Settings) -> Result<()> {
    let cache = CacheHandle::open(settings)?;
    CacheAdmin::new(Arc::clone(&cache.store)).clear()?;
    println!("{} Cache cleared", "✓".bright_green());
    Ok(())
}

pub fn purge_expired(settings: &Settings) -> Result<()> {
    let cache = CacheHandle::open(settings)?;
    let removed = CacheAdmin::new(Arc::clone(&cache.store)).purge_expired()?;
    info!("Purged {} expired entries", removed);
    println!("{} Removed {} expired entries", "✓".bright_green(), removed);
    Ok(())
}

/// Print the health report; fails when the cache is unhealthy
pub fn health(settings: &Settings) -> Result<()> {
    let cache = CacheHandle::open(settings)?;
    let status = CacheAdmin::new(Arc::clone(&cache.store)).status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    if !status.cache_healthy {
        anyhow::bail!(
            "cache unhealthy: {}",
            status.detail.unwrap_or_else(|| "unknown".to_string())
        );
    }
    Ok(())
}
