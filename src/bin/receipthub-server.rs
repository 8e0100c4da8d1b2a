//! HTTP server binary for receipthub.
//!
//! A thin shim over the library crate that maps CLI flags to `ScanConfig`
//! and serves the upload endpoint.

use anyhow::{Context, Result};
use clap::Parser;
use receipthub::{BillTable, ScanConfig, DEFAULT_LLM_BASE_URL, DEFAULT_MODEL, DEFAULT_PARSER_BASE_URL};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Start on the default port
  receipthub-server

  # Custom table location and port
  receipthub-server --listen 0.0.0.0:9000 --table /var/lib/receipthub/bills.csv

  # Upload a bill
  curl -F "bill=@receipt.pdf" -F "category=Utilities" \
       http://localhost:8000/upload-bill

ENVIRONMENT VARIABLES:
  LLAMA_CLOUD_API_KEY     Key for the hosted document-parsing service
  NVIDIA_API_KEY          Key for the chat-completions endpoint
  LLM_API_KEY             Fallback completions key when NVIDIA_API_KEY is unset
  RECEIPTHUB_*            Every flag below also reads its RECEIPTHUB_ variable

SETUP:
  1. Set keys:   export LLAMA_CLOUD_API_KEY=llx-...
                 export NVIDIA_API_KEY=nvapi-...
  2. Serve:      receipthub-server
  3. Upload:     curl -F "bill=@receipt.pdf" -F "category=Food" \
                      http://localhost:8000/upload-bill
"#;

/// Scan uploaded bills into a CSV table over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "receipthub-server",
    version,
    about = "Scan uploaded bills into a CSV table over HTTP",
    long_about = "Accepts bill uploads (PDF, JPEG, or PNG) over HTTP, extracts the company, \
address, and totals with a document parser plus a language model, and appends one row per \
bill to an append-only CSV table. Images are converted to single-page PDFs and every \
accepted bill is archived as a timestamped PDF copy.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "RECEIPTHUB_LISTEN", default_value = "0.0.0.0:8000")]
    listen: SocketAddr,

    /// Path of the append-only bill table.
    #[arg(long, env = "RECEIPTHUB_TABLE", default_value = "bills_data.csv")]
    table: PathBuf,

    /// Directory receiving one archived PDF per scanned bill.
    #[arg(long, env = "RECEIPTHUB_ARCHIVE_DIR", default_value = "scanned_bills")]
    archive_dir: PathBuf,

    /// Base URL of the document-parsing service.
    #[arg(long, env = "RECEIPTHUB_PARSER_URL", default_value = DEFAULT_PARSER_BASE_URL)]
    parser_url: String,

    /// Base URL of the OpenAI-compatible chat-completions endpoint.
    #[arg(long, env = "RECEIPTHUB_LLM_URL", default_value = DEFAULT_LLM_BASE_URL)]
    llm_url: String,

    /// Model ID used for field extraction.
    #[arg(long, env = "RECEIPTHUB_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "RECEIPTHUB_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Nucleus sampling cut-off (0.0–1.0).
    #[arg(long, env = "RECEIPTHUB_TOP_P", default_value_t = 0.7)]
    top_p: f32,

    /// Max tokens the model may generate per bill.
    #[arg(long, env = "RECEIPTHUB_MAX_TOKENS", default_value_t = 1500)]
    max_tokens: usize,

    /// Overall document-parsing deadline in seconds.
    #[arg(long, env = "RECEIPTHUB_PARSE_TIMEOUT", default_value_t = 120)]
    parse_timeout: u64,

    /// Interval between parse-job status polls in milliseconds.
    #[arg(long, env = "RECEIPTHUB_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Per-request completion timeout in seconds.
    #[arg(long, env = "RECEIPTHUB_COMPLETE_TIMEOUT", default_value_t = 60)]
    complete_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECEIPTHUB_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RECEIPTHUB_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build the scan configuration ─────────────────────────────────────
    let mut config = ScanConfig::builder()
        .table_path(&cli.table)
        .archive_dir(&cli.archive_dir)
        .parser_base_url(&cli.parser_url)
        .llm_base_url(&cli.llm_url)
        .model(&cli.model)
        .temperature(cli.temperature)
        .top_p(cli.top_p)
        .max_tokens(cli.max_tokens)
        .parse_timeout_secs(cli.parse_timeout)
        .poll_interval_ms(cli.poll_interval_ms)
        .complete_timeout_secs(cli.complete_timeout)
        .build()
        .context("Invalid configuration")?;

    // One shared table handle so concurrent uploads serialise on a single
    // writer lock.
    config.table = Some(Arc::new(BillTable::new(&cli.table)));

    tracing::info!(
        "Bill table: {} | archive: {} | model: {}",
        cli.table.display(),
        cli.archive_dir.display(),
        cli.model
    );

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;

    receipthub::server::serve(listener, config)
        .await
        .context("Server error")?;
    Ok(())
}
