//! Error types for the receipthub library.
//!
//! Every failure in the scan pipeline is terminal: nothing is retried, no
//! partial record is ever written, and each variant maps to exactly one HTTP
//! status at the server boundary via [`ScanError::http_status`]. Input
//! problems the caller can fix (missing file, missing category, wrong file
//! type) are 400s; everything downstream of a well-formed upload (external
//! services, reply parsing, storage) is a 500.
//!
//! Variants carry the context a caller needs to act on the message, such as
//! the offending content type or the table path, rather than a bare string.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the receipthub scan pipeline.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Caller input errors (HTTP 400) ────────────────────────────────────
    /// The upload contained no bill file, or the file part was empty.
    #[error("No bill file provided")]
    MissingFile,

    /// The upload contained no category, or the category was blank.
    #[error("No category selected")]
    MissingCategory,

    /// The declared content type is not one of the accepted bill formats.
    #[error("Unsupported file type '{content_type}'.\nPlease upload a PDF, JPEG, or PNG file.")]
    UnsupportedFormat { content_type: String },

    /// A local file given to [`crate::scan_file`] was not found or unreadable.
    #[error("Bill file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    // ── Normalisation errors ──────────────────────────────────────────────
    /// The uploaded image bytes could not be decoded.
    #[error("Could not decode the uploaded image: {detail}")]
    InvalidImage { detail: String },

    /// The permanent archive copy could not be written.
    #[error("Failed to archive the scanned bill to '{path}': {source}")]
    ArchiveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── External service errors ───────────────────────────────────────────
    /// The document parsing service produced no usable text.
    #[error("Failed to extract content from the bill: {detail}")]
    ExtractionFailed { detail: String },

    /// The chat-completions call failed (transport, HTTP status, or timeout).
    #[error("Model completion failed: {detail}")]
    CompletionFailed { detail: String },

    /// The model replied, but the reply was blank after trimming.
    #[error("Received an empty reply from the model")]
    EmptyCompletion,

    // ── Reply parsing errors ──────────────────────────────────────────────
    /// The model reply contained no fenced `json` block with an object.
    #[error("Failed to extract JSON from the model reply.\nThe reply did not contain a fenced ```json block.")]
    NoJsonBlockFound,

    /// A fenced block was found but its content is not valid JSON.
    #[error("Model reply contained malformed JSON: {detail}")]
    MalformedJson { detail: String },

    /// The JSON object is missing one or more of the required bill fields.
    #[error("Model reply is missing required fields: {missing:?}")]
    IncompleteRecord { missing: Vec<String> },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The bill table could not be created or appended to.
    #[error("Failed to write bill table '{path}': {detail}")]
    StoreWriteFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed, or a required credential is absent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// HTTP status code this error maps to at the server boundary.
    ///
    /// 400 for problems the caller can fix by changing the request; 500 for
    /// everything that goes wrong after a well-formed upload was accepted.
    pub fn http_status(&self) -> u16 {
        match self {
            ScanError::MissingFile
            | ScanError::MissingCategory
            | ScanError::UnsupportedFormat { .. }
            | ScanError::FileNotFound { .. } => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = ScanError::UnsupportedFormat {
            content_type: "text/plain".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("text/plain"), "got: {msg}");
        assert!(msg.contains("PDF, JPEG, or PNG"));
    }

    #[test]
    fn incomplete_record_display() {
        let e = ScanError::IncompleteRecord {
            missing: vec!["subtotal".into(), "total_amount".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("subtotal"));
        assert!(msg.contains("total_amount"));
    }

    #[test]
    fn store_write_failed_display() {
        let e = ScanError::StoreWriteFailed {
            path: PathBuf::from("bills_data.csv"),
            detail: "permission denied".into(),
        };
        assert!(e.to_string().contains("bills_data.csv"));
        assert!(e.to_string().contains("permission denied"));
    }

    #[test]
    fn caller_input_errors_are_400() {
        assert_eq!(ScanError::MissingFile.http_status(), 400);
        assert_eq!(ScanError::MissingCategory.http_status(), 400);
        assert_eq!(
            ScanError::UnsupportedFormat {
                content_type: "image/gif".into()
            }
            .http_status(),
            400
        );
    }

    #[test]
    fn downstream_errors_are_500() {
        assert_eq!(
            ScanError::ExtractionFailed {
                detail: "timeout".into()
            }
            .http_status(),
            500
        );
        assert_eq!(ScanError::EmptyCompletion.http_status(), 500);
        assert_eq!(ScanError::NoJsonBlockFound.http_status(), 500);
        assert_eq!(
            ScanError::MalformedJson {
                detail: "trailing comma".into()
            }
            .http_status(),
            500
        );
    }
}
