//! Document extraction: canonical PDF → text segments.
//!
//! The parsing service is a black-box collaborator behind the
//! [`DocumentExtractor`] trait. The pipeline only cares that *some* extractor
//! turns the canonical PDF into text segments; tests inject a fake, and the
//! shipped [`LlamaParseExtractor`] binds to the hosted LlamaParse REST API.
//!
//! ## Job lifecycle
//!
//! LlamaParse is asynchronous on the server side: an upload creates a job,
//! the job is polled until it leaves `PENDING`, and the markdown result is
//! fetched separately. The whole lifecycle runs under one overall deadline
//! so a stuck job cannot hold a scan open forever.

use crate::error::ScanError;
use crate::record::TextSegment;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Capability seam for the document-parsing service.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Parse the PDF at `path` into ordered text segments.
    ///
    /// Implementations report every failure (transport, service error,
    /// deadline) as [`ScanError::ExtractionFailed`]; emptiness of the result
    /// is judged by the orchestrator.
    async fn extract(&self, path: &Path) -> Result<Vec<TextSegment>, ScanError>;
}

/// REST binding for the hosted LlamaParse service.
///
/// Upload → poll → fetch-markdown, all authenticated with a bearer key and
/// bounded by `deadline`.
pub struct LlamaParseExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    deadline: Duration,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct ParseJob {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct MarkdownResult {
    markdown: String,
}

impl LlamaParseExtractor {
    /// Create an extractor against `base_url` with the given credentials.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        deadline: Duration,
        poll_interval: Duration,
    ) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(deadline)
            .build()
            .map_err(|e| ScanError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            deadline,
            poll_interval,
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/api/parsing/upload", self.base_url)
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/api/parsing/job/{}", self.base_url, job_id)
    }

    fn result_url(&self, job_id: &str) -> String {
        format!("{}/api/parsing/job/{}/result/markdown", self.base_url, job_id)
    }

    async fn submit(&self, path: &Path) -> Result<ParseJob, ScanError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ScanError::ExtractionFailed {
                detail: format!("could not read canonical PDF: {e}"),
            }
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bill.pdf".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")
            .map_err(|e| ScanError::Internal(format!("invalid upload part: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.upload_url())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| extraction_transport_error("upload", e))?;

        if !response.status().is_success() {
            return Err(ScanError::ExtractionFailed {
                detail: format!("parsing service upload returned HTTP {}", response.status()),
            });
        }

        response
            .json::<ParseJob>()
            .await
            .map_err(|e| ScanError::ExtractionFailed {
                detail: format!("unexpected upload reply: {e}"),
            })
    }

    async fn job_status(&self, job_id: &str) -> Result<String, ScanError> {
        let response = self
            .client
            .get(self.job_url(job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| extraction_transport_error("status poll", e))?;

        if !response.status().is_success() {
            return Err(ScanError::ExtractionFailed {
                detail: format!("status poll returned HTTP {}", response.status()),
            });
        }

        let job: ParseJob =
            response
                .json()
                .await
                .map_err(|e| ScanError::ExtractionFailed {
                    detail: format!("unexpected status reply: {e}"),
                })?;
        Ok(job.status)
    }

    async fn fetch_markdown(&self, job_id: &str) -> Result<String, ScanError> {
        let response = self
            .client
            .get(self.result_url(job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| extraction_transport_error("result fetch", e))?;

        if !response.status().is_success() {
            return Err(ScanError::ExtractionFailed {
                detail: format!("result fetch returned HTTP {}", response.status()),
            });
        }

        let result: MarkdownResult =
            response
                .json()
                .await
                .map_err(|e| ScanError::ExtractionFailed {
                    detail: format!("unexpected result reply: {e}"),
                })?;
        Ok(result.markdown)
    }
}

#[async_trait]
impl DocumentExtractor for LlamaParseExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<TextSegment>, ScanError> {
        let started = Instant::now();
        let job = self.submit(path).await?;
        debug!("Parse job {} submitted ({})", job.id, job.status);

        let mut status = job.status;
        while status != "SUCCESS" {
            if matches!(status.as_str(), "ERROR" | "CANCELED") {
                return Err(ScanError::ExtractionFailed {
                    detail: format!("parse job {} ended in status {status}", job.id),
                });
            }
            if started.elapsed() >= self.deadline {
                warn!("Parse job {} timed out in status {}", job.id, status);
                return Err(ScanError::ExtractionFailed {
                    detail: format!(
                        "parse job {} still {status} after {}s",
                        job.id,
                        self.deadline.as_secs()
                    ),
                });
            }
            sleep(self.poll_interval).await;
            status = self.job_status(&job.id).await?;
            debug!("Parse job {} → {}", job.id, status);
        }

        let markdown = self.fetch_markdown(&job.id).await?;
        debug!(
            "Parse job {} finished in {}ms ({} chars)",
            job.id,
            started.elapsed().as_millis(),
            markdown.len()
        );
        Ok(vec![TextSegment::new(markdown)])
    }
}

fn extraction_transport_error(stage: &str, e: reqwest::Error) -> ScanError {
    let detail = if e.is_timeout() {
        format!("{stage} timed out")
    } else {
        format!("{stage} failed: {e}")
    };
    ScanError::ExtractionFailed { detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls_are_rooted_at_base() {
        let ex = LlamaParseExtractor::new(
            "https://parser.example/",
            "key",
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .unwrap();
        assert_eq!(ex.upload_url(), "https://parser.example/api/parsing/upload");
        assert_eq!(ex.job_url("abc"), "https://parser.example/api/parsing/job/abc");
        assert_eq!(
            ex.result_url("abc"),
            "https://parser.example/api/parsing/job/abc/result/markdown"
        );
    }
}
