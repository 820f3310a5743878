use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod settings;

use commands::*;
use settings::Settings;

#[derive(Parser)]
#[command(name = "sqe")]
#[command(author, version, about = "SPARQL result cache and query enhancement engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON settings file; environment variables still take precedence
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a query through the cache
    #[command(group(ArgGroup::new("source").required(true).args(["sparql", "file"])))]
    Query {
        /// SPARQL query text
        #[arg(short, long)]
        sparql: Option<String>,

        /// File containing the query
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Print the normalized form and cache key of a query
    Key {
        /// SPARQL query text
        sparql: String,
    },

    /// Show the label-resolution rewrite of a query without running it
    Enhance {
        /// SPARQL query text
        sparql: String,
    },

    /// Show cache statistics
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Remove every cached result
    Clear,

    /// Report cache health as JSON
    Health,

    /// Delete expired entries now
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    // Load configuration: defaults, then file, then environment
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?.overlay_env()?,
        None => Settings::from_env()?,
    };
    settings.validate()?;

    match cli.command {
        Commands::Query {
            sparql,
            file,
            output,
        } => {
            let query = read_query(sparql, file.as_deref())?;
            run_query(&settings, &query, output).await?;
        }
        Commands::Key { sparql } => show_key(&sparql),
        Commands::Enhance { sparql } => show_enhancement(&settings, &sparql),
        Commands::Stats { output } => show_stats(&settings, output)?,
        Commands::Clear => clear_cache(&settings)?,
        Commands::Health => health(&settings)?,
        Commands::Purge => purge_expired(&settings)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "sqe=debug,sparql_core=debug,sparql_cache=debug,sparql_enhancer=debug,sparql_executor=debug"
    } else {
        "sqe=info,sparql_cache=info,sparql_executor=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
