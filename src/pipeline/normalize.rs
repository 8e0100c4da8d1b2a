//! Format normalisation: turn any accepted upload into one canonical PDF.
//!
//! ## Why normalise to PDF?
//!
//! The parsing service consumes PDF files from a path; it cannot take raw
//! image bytes. Writing every upload into a `NamedTempFile` gives the
//! extractor a path to send while ensuring cleanup happens automatically
//! when [`CanonicalDocument`] is dropped, even if the process panics.
//!
//! PDF uploads pass through byte-for-byte. JPEG/PNG uploads are decoded,
//! forced to RGB, and embedded as a full-page image in a minimal one-page
//! PDF. The raw RGB stream is Flate-compressed inside the container, so the
//! wrapping is lossless: the exact pixels can be recovered from the PDF.
//!
//! Before the temp file is handed on, a permanent copy lands in the archive
//! directory under `bill_{timestamp}.pdf`. Archive copies are never deleted
//! by this system.

use crate::error::ScanError;
use crate::record::{BillKind, BillUpload};
use chrono::Local;
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// The parse-ready single PDF plus its permanent archive copy.
///
/// The temp file is deleted when this value is dropped; the orchestrator
/// keeps it alive exactly as long as the extractor needs the path.
#[derive(Debug)]
pub struct CanonicalDocument {
    file: NamedTempFile,
    archived_to: PathBuf,
    kind: BillKind,
}

impl CanonicalDocument {
    /// Path of the canonical temp PDF.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Path of the permanent archive copy.
    pub fn archived_to(&self) -> &Path {
        &self.archived_to
    }

    /// The format the upload arrived in.
    pub fn kind(&self) -> BillKind {
        self.kind
    }
}

/// Normalise an upload into a canonical temp PDF and archive a copy.
///
/// Rejects unsupported content types before any file is created, so a bad
/// upload leaves no trace on disk.
pub fn normalize(upload: &BillUpload, archive_dir: &Path) -> Result<CanonicalDocument, ScanError> {
    let kind = BillKind::from_content_type(&upload.content_type).ok_or_else(|| {
        ScanError::UnsupportedFormat {
            content_type: upload.content_type.clone(),
        }
    })?;

    let mut file = tempfile::Builder::new()
        .prefix("bill_")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| ScanError::Internal(format!("failed to create temp file: {e}")))?;

    match kind {
        BillKind::Pdf => {
            file.write_all(&upload.bytes)
                .map_err(|e| ScanError::Internal(format!("failed to write temp file: {e}")))?;
            debug!("PDF upload passed through ({} bytes)", upload.bytes.len());
        }
        BillKind::Jpeg | BillKind::Png => {
            let pdf_bytes = image_to_pdf(&upload.bytes)?;
            file.write_all(&pdf_bytes)
                .map_err(|e| ScanError::Internal(format!("failed to write temp file: {e}")))?;
            debug!(
                "{} upload converted to PDF ({} → {} bytes)",
                kind.content_type(),
                upload.bytes.len(),
                pdf_bytes.len()
            );
        }
    }
    file.flush()
        .map_err(|e| ScanError::Internal(format!("failed to flush temp file: {e}")))?;

    let archived_to = archive_copy(file.path(), archive_dir)?;
    info!(
        "Normalised '{}' → {} (archived to {})",
        upload.file_name,
        file.path().display(),
        archived_to.display()
    );

    Ok(CanonicalDocument {
        file,
        archived_to,
        kind,
    })
}

/// Copy the canonical PDF into the archive directory under a timestamped name.
///
/// Millisecond resolution keeps names unique at any realistic upload rate;
/// collisions below that would overwrite, which is accepted.
fn archive_copy(canonical: &Path, archive_dir: &Path) -> Result<PathBuf, ScanError> {
    std::fs::create_dir_all(archive_dir).map_err(|e| ScanError::ArchiveFailed {
        path: archive_dir.to_path_buf(),
        source: e,
    })?;

    let stamp = Local::now().format("%Y%m%d%H%M%S%3f");
    let archived = archive_dir.join(format!("bill_{stamp}.pdf"));
    std::fs::copy(canonical, &archived).map_err(|e| ScanError::ArchiveFailed {
        path: archived.clone(),
        source: e,
    })?;

    Ok(archived)
}

/// Wrap decoded image pixels in a minimal one-page PDF.
///
/// The page MediaBox matches the pixel dimensions (one PDF unit per pixel),
/// so the image fills the page exactly. The image XObject carries the raw
/// RGB bytes; `Document::compress` Flate-encodes every stream before the
/// document is serialised, so the pixels round-trip losslessly through
/// `decompressed_content` on the way back out.
fn image_to_pdf(bytes: &[u8]) -> Result<Vec<u8>, ScanError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ScanError::InvalidImage {
        detail: e.to_string(),
    })?;
    let rgb: RgbImage = decoded.to_rgb8();
    let (width, height) = (rgb.width(), rgb.height());
    debug!("Decoded image {}x{} px", width, height);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        rgb.into_raw(),
    ));

    // q/Q isolates the transform; cm scales the unit image square up to the
    // full page before Do paints it.
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    (width as i64).into(),
                    0.into(),
                    0.into(),
                    (height as i64).into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content
        .encode()
        .map_err(|e| ScanError::Internal(format!("failed to encode PDF content stream: {e}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im0" => image_id },
    });

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            (width as i64).into(),
            (height as i64).into(),
        ],
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ScanError::Internal(format!("failed to serialise PDF: {e}")))?;
    Ok(out)
}
