//! Scan orchestration: one uploaded bill in, one table row out.
//!
//! [`scan`] is the primary entry point. It drives the full pipeline in
//! order and owns the lifetime of the canonical temp PDF, so the temp file
//! is deleted on every path out of the function, success and failure alike.
//! Only the archive copy and (on success) the table row survive a scan.
//!
//! Stage failures map to distinct [`ScanError`] variants; the HTTP layer
//! relies on that mapping to split caller mistakes (400) from downstream
//! failures (500).

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::pipeline::extract::{DocumentExtractor, LlamaParseExtractor};
use crate::pipeline::interpret::{ChatCompletionsInterpreter, FieldInterpreter};
use crate::pipeline::normalize;
use crate::pipeline::parse;
use crate::prompts;
use crate::record::{BillKind, BillRecord, BillUpload};
use crate::store::BillTable;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One bill to scan, plus the caller-chosen category attached to its row.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub upload: BillUpload,
    /// Free-text expense category. Leading and trailing whitespace is
    /// stripped; a blank category is rejected.
    pub category: String,
}

impl ScanRequest {
    pub fn new(upload: BillUpload, category: impl Into<String>) -> Self {
        Self {
            upload,
            category: category.into(),
        }
    }
}

/// Everything a successful scan produced.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    /// The row appended to the bill table.
    pub record: BillRecord,
    /// The model's reply, trimmed, exactly as parsed.
    pub raw_response: String,
    /// Where the archive copy of the canonical PDF landed.
    pub archived_to: PathBuf,
    /// Per-stage timings and sizes.
    pub stats: ScanStats,
}

/// Timing and size statistics for one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    /// Number of text segments the extractor returned.
    pub segments: usize,
    /// Total characters of extracted text handed to the model.
    pub extracted_chars: usize,
    pub normalize_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub interpret_duration_ms: u64,
    pub store_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Scan one uploaded bill end to end.
///
/// # Errors
/// - [`ScanError::MissingFile`] / [`ScanError::MissingCategory`] /
///   [`ScanError::UnsupportedFormat`] for caller mistakes, raised before
///   anything is written anywhere
/// - extraction, completion, parsing, and store variants for downstream
///   failures; by then the archive copy exists and is deliberately kept
pub async fn scan(request: ScanRequest, config: &ScanConfig) -> Result<ScanOutput, ScanError> {
    let total_start = Instant::now();

    // ── Step 1: Validate the request ─────────────────────────────────────
    if request.upload.bytes.is_empty() {
        return Err(ScanError::MissingFile);
    }
    let category = request.category.trim().to_string();
    if category.is_empty() {
        return Err(ScanError::MissingCategory);
    }
    info!(
        "Scanning bill: {} ({} bytes, category {:?})",
        request.upload.file_name,
        request.upload.bytes.len(),
        category
    );

    // ── Step 2: Normalise to a canonical PDF ─────────────────────────────
    // Image decoding and PDF assembly are CPU-bound; keep them off the
    // async workers.
    let normalize_start = Instant::now();
    let upload = request.upload;
    let archive_dir = config.archive_dir.clone();
    let canonical =
        tokio::task::spawn_blocking(move || normalize::normalize(&upload, &archive_dir))
            .await
            .map_err(|e| ScanError::Internal(format!("normalise task failed: {e}")))??;
    let normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;
    debug!(
        "Canonical PDF at {} (archived to {})",
        canonical.path().display(),
        canonical.archived_to().display()
    );

    // ── Step 3: Extract document text ────────────────────────────────────
    let extractor = resolve_extractor(config)?;
    let extract_start = Instant::now();
    let segments = extractor.extract(canonical.path()).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    if segments.is_empty() {
        return Err(ScanError::ExtractionFailed {
            detail: "parsing service returned no text segments".to_string(),
        });
    }
    let text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() {
        return Err(ScanError::ExtractionFailed {
            detail: "parsing service returned empty text".to_string(),
        });
    }
    info!(
        "Extracted {} chars in {} segment(s), {}ms",
        text.len(),
        segments.len(),
        extract_duration_ms
    );

    // ── Step 4: Interpret the fields ─────────────────────────────────────
    let interpreter = resolve_interpreter(config)?;
    let prompt = prompts::extraction_prompt(&text);
    let interpret_start = Instant::now();
    let reply = interpreter.complete(&prompt).await?;
    let interpret_duration_ms = interpret_start.elapsed().as_millis() as u64;

    let raw_response = reply.trim().to_string();
    if raw_response.is_empty() {
        return Err(ScanError::EmptyCompletion);
    }
    debug!("Model replied with {} chars", raw_response.len());

    // ── Step 5: Parse and validate the reply ─────────────────────────────
    let fields = parse::parse_fields(&raw_response)?;

    // ── Step 6: Append to the bill table ─────────────────────────────────
    let record = fields.into_record(category, Local::now().date_naive());
    let table = resolve_table(config);
    let store_start = Instant::now();
    let row = record.clone();
    let writer = Arc::clone(&table);
    tokio::task::spawn_blocking(move || writer.append(&row))
        .await
        .map_err(|e| ScanError::Internal(format!("store task failed: {e}")))??;
    let store_duration_ms = store_start.elapsed().as_millis() as u64;

    let stats = ScanStats {
        segments: segments.len(),
        extracted_chars: text.len(),
        normalize_duration_ms,
        extract_duration_ms,
        interpret_duration_ms,
        store_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Scan complete: {} / {} stored in {}ms",
        record.company_name, record.category, stats.total_duration_ms
    );

    let archived_to = canonical.archived_to().to_path_buf();
    // `canonical` is dropped here, deleting the temp PDF; the archive copy
    // stays.
    Ok(ScanOutput {
        record,
        raw_response,
        archived_to,
        stats,
    })
}

/// Scan a bill already on disk, classifying it by file extension.
///
/// Convenience wrapper for callers that hold a path rather than bytes.
pub async fn scan_file(
    path: impl AsRef<Path>,
    category: impl Into<String>,
    config: &ScanConfig,
) -> Result<ScanOutput, ScanError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| ScanError::FileNotFound {
            path: path.to_path_buf(),
        })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let kind = BillKind::from_extension(ext).ok_or_else(|| ScanError::UnsupportedFormat {
        content_type: if ext.is_empty() {
            "unknown".to_string()
        } else {
            ext.to_string()
        },
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bill".to_string());
    let upload = BillUpload::new(bytes, file_name, kind.content_type());
    scan(ScanRequest::new(upload, category), config).await
}

// ── Capability resolution ────────────────────────────────────────────────

/// Resolve the document extractor, from most-specific to least-specific:
///
/// 1. **Injected capability** (`config.extractor`): the caller constructed
///    the extractor entirely; used as-is. This is how tests run the pipeline
///    without the hosted service.
/// 2. **Configured key** (`config.parser_api_key`).
/// 3. **Environment** (`LLAMA_CLOUD_API_KEY`).
fn resolve_extractor(config: &ScanConfig) -> Result<Arc<dyn DocumentExtractor>, ScanError> {
    if let Some(ref extractor) = config.extractor {
        return Ok(Arc::clone(extractor));
    }

    let key = config
        .parser_api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| env_key("LLAMA_CLOUD_API_KEY"))
        .ok_or_else(|| {
            ScanError::InvalidConfig(
                "no parsing credentials configured.\n\
                 Set LLAMA_CLOUD_API_KEY, or provide parser_api_key / a custom extractor."
                    .to_string(),
            )
        })?;

    let extractor = LlamaParseExtractor::new(
        &config.parser_base_url,
        key,
        Duration::from_secs(config.parse_timeout_secs),
        Duration::from_millis(config.poll_interval_ms),
    )?;
    Ok(Arc::new(extractor))
}

/// Resolve the field interpreter: injected capability, then the configured
/// key, then `NVIDIA_API_KEY`, then `LLM_API_KEY`.
fn resolve_interpreter(config: &ScanConfig) -> Result<Arc<dyn FieldInterpreter>, ScanError> {
    if let Some(ref interpreter) = config.interpreter {
        return Ok(Arc::clone(interpreter));
    }

    let key = config
        .llm_api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| env_key("NVIDIA_API_KEY"))
        .or_else(|| env_key("LLM_API_KEY"))
        .ok_or_else(|| {
            ScanError::InvalidConfig(
                "no completion credentials configured.\n\
                 Set NVIDIA_API_KEY or LLM_API_KEY, or provide llm_api_key / a custom interpreter."
                    .to_string(),
            )
        })?;

    let interpreter = ChatCompletionsInterpreter::new(
        &config.llm_base_url,
        key,
        &config.model,
        config.temperature,
        config.top_p,
        config.max_tokens,
        Duration::from_secs(config.complete_timeout_secs),
    )?;
    Ok(Arc::new(interpreter))
}

fn resolve_table(config: &ScanConfig) -> Arc<BillTable> {
    match config.table {
        Some(ref table) => Arc::clone(table),
        None => Arc::new(BillTable::new(&config.table_path)),
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path) -> ScanConfig {
        ScanConfig::builder()
            .table_path(dir.join("bills.csv"))
            .archive_dir(dir.join("archive"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn empty_upload_is_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let request = ScanRequest::new(
            BillUpload::new(Vec::new(), "bill.pdf", "application/pdf"),
            "Food",
        );
        assert!(matches!(
            scan(request, &config).await,
            Err(ScanError::MissingFile)
        ));
    }

    #[tokio::test]
    async fn blank_category_is_missing_category() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let request = ScanRequest::new(
            BillUpload::new(b"%PDF-1.4".to_vec(), "bill.pdf", "application/pdf"),
            "   ",
        );
        assert!(matches!(
            scan(request, &config).await,
            Err(ScanError::MissingCategory)
        ));
    }

    #[tokio::test]
    async fn missing_file_outranks_missing_category() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let request = ScanRequest::new(BillUpload::new(Vec::new(), "bill.pdf", "application/pdf"), "");
        assert!(matches!(
            scan(request, &config).await,
            Err(ScanError::MissingFile)
        ));
    }

    #[tokio::test]
    async fn unsupported_type_rejected_before_extraction() {
        let dir = tempfile::tempdir().unwrap();
        // No extractor and no credentials configured: reaching Step 3 would
        // fail with InvalidConfig, so an UnsupportedFormat error proves the
        // scan stopped at normalisation.
        let config = test_config(dir.path());
        let request = ScanRequest::new(
            BillUpload::new(b"hello".to_vec(), "bill.txt", "text/plain"),
            "Food",
        );
        match scan(request, &config).await {
            Err(ScanError::UnsupportedFormat { content_type }) => {
                assert_eq!(content_type, "text/plain");
            }
            other => panic!("expected UnsupportedFormat, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn scan_file_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let missing = dir.path().join("nope.pdf");
        match scan_file(&missing, "Food", &config).await {
            Err(ScanError::FileNotFound { path }) => {
                assert!(path.ends_with("nope.pdf"), "got: {}", path.display());
            }
            other => panic!("expected FileNotFound, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn scan_file_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(matches!(
            scan_file(&path, "Food", &config).await,
            Err(ScanError::UnsupportedFormat { .. })
        ));
    }
}
