//! Lookout CLI
//!
//! Command-line interface for working with Lookout search pipelines.
//!
//! # Usage
//!
//! ```bash
//! lookout --help
//! lookout parse "search severity<=3 | stats count by host"
//! lookout sql --backend embedded "search message~timeout"
//! lookout run "search severity<=3 | limit 10"
//! ```

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use engine::config::EngineConfig;
use engine::exec::ExecutionGateway;
use engine::query;
use engine::render;

/// Lookout CLI - log search pipeline tooling
#[derive(Parser)]
#[command(name = "lookout")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SqlBackend {
    /// ClickHouse SQL
    Columnar,
    /// SQLite SQL
    Embedded,
    /// Render for both backends
    Both,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a query and print its validated plan
    Parse {
        /// The search pipeline text
        query: String,

        /// Evaluation window (e.g. "-1h", "-7d", "start..end")
        #[arg(short, long, default_value = "-1h")]
        range: String,
    },
    /// Render a query to backend SQL
    Sql {
        /// The search pipeline text
        query: String,

        /// Evaluation window
        #[arg(short, long, default_value = "-1h")]
        range: String,

        /// Period-over-period comparison offset (e.g. "1d", "1w")
        #[arg(short, long)]
        compare: Option<String>,

        /// Which backend dialect to render
        #[arg(short, long, value_enum, default_value_t = SqlBackend::Both)]
        backend: SqlBackend,
    },
    /// Run a query against the configured backend
    Run {
        /// The search pipeline text
        query: String,

        /// Evaluation window
        #[arg(short, long, default_value = "-1h")]
        range: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Parse { query, range }) => {
            let plan = query::compile(&query, &range, None)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Some(Commands::Sql {
            query,
            range,
            compare,
            backend,
        }) => {
            let plan = query::compile(&query, &range, compare.as_deref())?;
            if backend != SqlBackend::Embedded {
                print_native("columnar", &render::columnar::render(&plan));
            }
            if backend != SqlBackend::Columnar {
                print_native("embedded", &render::embedded::render(&plan));
            }
        }
        Some(Commands::Run { query, range }) => {
            let config = EngineConfig::from_env()?;
            let gateway = ExecutionGateway::from_config(&config)
                .context("Failed to open the configured backend")?;
            let plan = query::compile(&query, &range, None)?;
            let results = gateway.execute(&plan).await?;

            println!("{}", engine::report::format_json(&results));
            eprintln!("{} row(s)", results.len());
        }
        None => {
            println!("Lookout CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_native(label: &str, native: &render::NativeQuery) {
    println!("-- {label}");
    println!("{}", native.current.sql);
    println!("-- params: {}", serde_json::json!(native.current.params));
    if let Some(comparison) = &native.comparison {
        println!("-- {label} (comparison window)");
        println!("{}", comparison.sql);
        println!("-- params: {}", serde_json::json!(comparison.params));
    }
}
