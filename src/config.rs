//! Configuration for the bill scan pipeline.
//!
//! All pipeline behaviour is controlled through [`ScanConfig`], built via its
//! [`ScanConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share a config across requests, log a run's effective settings, and
//! diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.
//!
//! The three `Option<Arc<…>>` slots (`extractor`, `interpreter`, `table`)
//! exist so tests and embedders can inject their own capabilities; when left
//! unset, the REST bindings are constructed from the URL/key fields at scan
//! time and the table is opened from `table_path`.

use crate::error::ScanError;
use crate::pipeline::extract::DocumentExtractor;
use crate::pipeline::interpret::FieldInterpreter;
use crate::store::BillTable;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default base URL of the hosted document-parsing service.
pub const DEFAULT_PARSER_BASE_URL: &str = "https://api.cloud.llamaindex.ai";

/// Default base URL of the OpenAI-compatible chat-completions endpoint.
pub const DEFAULT_LLM_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";

/// Default model used for field extraction.
pub const DEFAULT_MODEL: &str = "mistralai/mixtral-8x22b-instruct-v0.1";

/// Configuration for a bill scan.
///
/// Built via [`ScanConfig::builder()`] or using [`ScanConfig::default()`].
///
/// # Example
/// ```rust
/// use receipthub::ScanConfig;
///
/// let config = ScanConfig::builder()
///     .table_path("bills_data.csv")
///     .archive_dir("scanned_bills")
///     .model("mistralai/mixtral-8x22b-instruct-v0.1")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ScanConfig {
    /// Path of the append-only bill table. Default: `bills_data.csv`.
    pub table_path: PathBuf,

    /// Directory receiving one timestamped PDF copy per scanned bill.
    /// Created on first use. Default: `scanned_bills`.
    pub archive_dir: PathBuf,

    /// Base URL of the document-parsing service.
    pub parser_base_url: String,

    /// API key for the parsing service. If `None`, `LLAMA_CLOUD_API_KEY` is
    /// read from the environment when the extractor is resolved.
    pub parser_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible chat-completions endpoint.
    pub llm_base_url: String,

    /// API key for the completions endpoint. If `None`, `NVIDIA_API_KEY`
    /// then `LLM_API_KEY` are read from the environment when the interpreter
    /// is resolved.
    pub llm_api_key: Option<String>,

    /// Model identifier sent with every completion request.
    pub model: String,

    /// Sampling temperature for the completion. Default: 0.1.
    ///
    /// Low values keep the model close to what is actually printed on the
    /// bill. Higher values make it paraphrase and fabricate amounts.
    pub temperature: f32,

    /// Nucleus sampling cut-off. Default: 0.7.
    pub top_p: f32,

    /// Maximum tokens the model may generate. Default: 1500.
    ///
    /// A four-field JSON reply fits in well under 200 tokens; the headroom
    /// covers models that narrate around the fenced block.
    pub max_tokens: usize,

    /// Overall deadline for the parsing job (upload + polling + result
    /// fetch) in seconds. Default: 120.
    pub parse_timeout_secs: u64,

    /// Interval between parse-job status polls in milliseconds. Default: 1000.
    pub poll_interval_ms: u64,

    /// Per-request timeout for the completion call in seconds. Default: 60.
    pub complete_timeout_secs: u64,

    /// Pre-constructed document extractor. Takes precedence over the
    /// parser URL/key fields.
    pub extractor: Option<Arc<dyn DocumentExtractor>>,

    /// Pre-constructed field interpreter. Takes precedence over the
    /// LLM URL/key/model fields.
    pub interpreter: Option<Arc<dyn FieldInterpreter>>,

    /// Shared bill table. Set this when multiple scans may run in one
    /// process so they serialise on a single writer lock; if `None`, a
    /// table handle is opened from `table_path` per scan.
    pub table: Option<Arc<BillTable>>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from("bills_data.csv"),
            archive_dir: PathBuf::from("scanned_bills"),
            parser_base_url: DEFAULT_PARSER_BASE_URL.to_string(),
            parser_api_key: None,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            top_p: 0.7,
            max_tokens: 1500,
            parse_timeout_secs: 120,
            poll_interval_ms: 1000,
            complete_timeout_secs: 60,
            extractor: None,
            interpreter: None,
            table: None,
        }
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("table_path", &self.table_path)
            .field("archive_dir", &self.archive_dir)
            .field("parser_base_url", &self.parser_base_url)
            .field("parser_api_key", &self.parser_api_key.as_ref().map(|_| "<redacted>"))
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("parse_timeout_secs", &self.parse_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("complete_timeout_secs", &self.complete_timeout_secs)
            .field("extractor", &self.extractor.as_ref().map(|_| "<dyn DocumentExtractor>"))
            .field("interpreter", &self.interpreter.as_ref().map(|_| "<dyn FieldInterpreter>"))
            .field("table", &self.table.as_ref().map(|_| "<BillTable>"))
            .finish()
    }
}

impl ScanConfig {
    /// Create a new builder for `ScanConfig`.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ScanConfig`].
#[derive(Debug)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn table_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.table_path = path.into();
        self
    }

    pub fn archive_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.archive_dir = path.into();
        self
    }

    pub fn parser_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.parser_base_url = url.into();
        self
    }

    pub fn parser_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.parser_api_key = Some(key.into());
        self
    }

    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.llm_base_url = url.into();
        self
    }

    pub fn llm_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.llm_api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn parse_timeout_secs(mut self, secs: u64) -> Self {
        self.config.parse_timeout_secs = secs;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(10);
        self
    }

    pub fn complete_timeout_secs(mut self, secs: u64) -> Self {
        self.config.complete_timeout_secs = secs;
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn interpreter(mut self, interpreter: Arc<dyn FieldInterpreter>) -> Self {
        self.config.interpreter = Some(interpreter);
        self
    }

    pub fn table(mut self, table: Arc<BillTable>) -> Self {
        self.config.table = Some(table);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScanConfig, ScanError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ScanError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.parse_timeout_secs == 0 {
            return Err(ScanError::InvalidConfig(
                "parse_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.complete_timeout_secs == 0 {
            return Err(ScanError::InvalidConfig(
                "complete_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.table_path.as_os_str().is_empty() {
            return Err(ScanError::InvalidConfig("table_path must not be empty".into()));
        }
        Ok(self.config)
    }
}
