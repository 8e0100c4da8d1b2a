//! Data model for the bill scan pipeline.
//!
//! The types here are deliberately plain serde carriers: the pipeline stages
//! pass them by value and the store serialises [`BillRecord`] directly, so
//! field declaration order doubles as the table column order. Changing the
//! order of `BillRecord` fields changes the CSV schema.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A bill file received from a caller, alive for one scan only.
#[derive(Debug, Clone)]
pub struct BillUpload {
    /// Raw file bytes as uploaded.
    pub bytes: Vec<u8>,
    /// Client-supplied file name, used for logging only.
    pub file_name: String,
    /// Declared MIME type. Format dispatch trusts this declaration; content
    /// sniffing is not performed.
    pub content_type: String,
}

impl BillUpload {
    pub fn new(
        bytes: Vec<u8>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            content_type: content_type.into(),
        }
    }
}

/// The accepted bill formats.
///
/// Exactly three MIME types are accepted; everything else is rejected before
/// any temp file or archive copy exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillKind {
    Pdf,
    Jpeg,
    Png,
}

impl BillKind {
    /// Classify a declared MIME type, tolerating parameters and case
    /// (`"image/JPEG; charset=utf-8"` → [`BillKind::Jpeg`]).
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .map(str::trim)
            .unwrap_or(content_type)
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(BillKind::Pdf),
            "image/jpeg" => Some(BillKind::Jpeg),
            "image/png" => Some(BillKind::Png),
            _ => None,
        }
    }

    /// Classify a file extension (`"pdf"`, `"jpg"`, `"jpeg"`, `"png"`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(BillKind::Pdf),
            "jpg" | "jpeg" => Some(BillKind::Jpeg),
            "png" => Some(BillKind::Png),
            _ => None,
        }
    }

    /// The canonical MIME type for this kind.
    pub fn content_type(&self) -> &'static str {
        match self {
            BillKind::Pdf => "application/pdf",
            BillKind::Jpeg => "image/jpeg",
            BillKind::Png => "image/png",
        }
    }

    /// True for the kinds that need image-to-PDF conversion.
    pub fn is_image(&self) -> bool {
        matches!(self, BillKind::Jpeg | BillKind::Png)
    }
}

/// One unit of text returned by the document extractor.
///
/// The orchestrator joins segment texts with `"\n"` in the order returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
}

impl TextSegment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// The four financial fields the model extracts from a bill.
///
/// Currency fields stay display-formatted text exactly as the model produced
/// them (`"$44.80"`); downstream consumers strip non-numeric characters
/// before interpreting them as numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillFields {
    pub company_name: String,
    pub address: String,
    pub subtotal: String,
    pub total_amount: String,
}

impl BillFields {
    /// The required keys in the model's JSON reply, in schema order.
    pub const FIELD_NAMES: [&'static str; 4] =
        ["company_name", "address", "subtotal", "total_amount"];

    /// Attach the caller's category and the processing date, producing the
    /// row that is appended to the bill table.
    pub fn into_record(self, category: impl Into<String>, scanned_on: NaiveDate) -> BillRecord {
        BillRecord {
            company_name: self.company_name,
            address: self.address,
            subtotal: self.subtotal,
            total_amount: self.total_amount,
            category: category.into(),
            scanned_on,
        }
    }
}

/// A complete bill row as stored in the table and echoed to HTTP callers.
///
/// Field order is the table column order. `scanned_on` serialises under the
/// legacy column name `Scanned_on` with `%Y-%m-%d` formatting, which is what
/// the dashboard consuming the table expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillRecord {
    pub company_name: String,
    pub address: String,
    pub subtotal: String,
    pub total_amount: String,
    pub category: String,
    #[serde(rename = "Scanned_on")]
    pub scanned_on: NaiveDate,
}
