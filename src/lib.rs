//! # receipthub
//!
//! Scan bills and receipts into an append-only CSV table.
//!
//! ## Why this crate?
//!
//! Expense bookkeeping usually dies at the "type the receipt into a
//! spreadsheet" step. receipthub takes the receipt as uploaded (PDF, JPEG,
//! or PNG), has a hosted document parser read it, asks a language model for
//! the handful of fields worth keeping, and appends one validated row per
//! bill to a CSV table a spreadsheet or dashboard can consume directly.
//! Every accepted bill also leaves a timestamped PDF copy in an archive
//! directory, so the table can always be audited against the originals.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bill upload (PDF / JPEG / PNG)
//!  │
//!  ├─ 1. Normalise  image → single-page PDF; archive a timestamped copy
//!  ├─ 2. Extract    canonical PDF → markdown text (LlamaParse REST)
//!  ├─ 3. Interpret  extraction prompt → model reply (chat completions)
//!  ├─ 4. Parse      fenced JSON block → validated bill fields
//!  └─ 5. Store      category + scan date attached; row appended to CSV
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receipthub::{scan_file, ScanConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials resolved from LLAMA_CLOUD_API_KEY / NVIDIA_API_KEY
//!     let config = ScanConfig::default();
//!     let output = scan_file("receipt.pdf", "Utilities", &config).await?;
//!     println!("{}: {}", output.record.company_name, output.record.total_amount);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | HTTP upload endpoint and the `receipthub-server` binary (axum + tower-http + clap + anyhow + tracing-subscriber) |
//!
//! Disable `server` when embedding only the library:
//! ```toml
//! receipthub = { version = "0.2", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod record;
pub mod scan;
#[cfg(feature = "server")]
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ScanConfig, ScanConfigBuilder, DEFAULT_LLM_BASE_URL, DEFAULT_MODEL, DEFAULT_PARSER_BASE_URL,
};
pub use error::ScanError;
pub use pipeline::extract::DocumentExtractor;
pub use pipeline::interpret::FieldInterpreter;
pub use record::{BillFields, BillKind, BillRecord, BillUpload, TextSegment};
pub use scan::{scan, scan_file, ScanOutput, ScanRequest, ScanStats};
pub use store::BillTable;
