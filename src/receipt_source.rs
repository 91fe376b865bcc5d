// src/receipt_source.rs

use lopdf::Document;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Result of turning a receipt file into text.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptContent {
    /// OCR transcript or text layer, ready for the receipt parser.
    Text(String),
    /// A photo or scanned PDF. It has to go through an OCR engine first.
    NeedsOcr,
    /// Something went wrong while reading the file.
    Error(String),
}

/// A text layer shorter than this (ignoring whitespace) is not a receipt.
const MIN_TEXT_CHARS: usize = 30;

const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "ocr"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "heic", "webp", "tif", "tiff", "bmp"];

/// Read a receipt file. Transcripts are used as-is, PDFs go through text
/// extraction and images are reported as needing OCR.
pub fn load_receipt(path: &Path, max_bytes: u64) -> ReceiptContent {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => return ReceiptContent::Error(format!("Cannot read {}: {e}", path.display())),
    };
    if size > max_bytes {
        warn!(size, max_bytes, "Receipt file too large");
        return ReceiptContent::Error(format!(
            "{} is {size} bytes, the limit is {max_bytes}",
            path.display()
        ));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        info!(file = %path.display(), "Receipt is an image, needs OCR");
        return ReceiptContent::NeedsOcr;
    }

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => return ReceiptContent::Error(format!("Cannot read {}: {e}", path.display())),
    };

    if extension == "pdf" {
        return extract_text_from_pdf(&bytes);
    }

    match String::from_utf8(bytes) {
        Ok(text) => {
            if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
                info!(extension = %extension, "Unknown extension, reading as transcript");
            }
            info!(chars = text.len(), "Receipt transcript loaded");
            ReceiptContent::Text(text)
        }
        Err(_) => ReceiptContent::Error(format!("{} is not a text transcript", path.display())),
    }
}

/// Run [`load_receipt`] on a blocking thread, giving up after `limit`.
pub async fn load_receipt_with_timeout(
    path: PathBuf,
    max_bytes: u64,
    limit: Duration,
) -> Result<ReceiptContent, Box<dyn std::error::Error>> {
    let task = tokio::task::spawn_blocking(move || load_receipt(&path, max_bytes));
    match tokio::time::timeout(limit, task).await {
        Ok(joined) => Ok(joined?),
        Err(_) => Err(format!("Receipt extraction timed out after {}s", limit.as_secs()).into()),
    }
}

/// Read a PDF receipt. Till printers and booking sites emit a text layer;
/// a phone photo saved as PDF only carries the picture and goes to OCR.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> ReceiptContent {
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return ReceiptContent::Error(format!("Receipt PDF is unreadable: {e}")),
    };

    let (photographed, pages) = photographed_pages(&doc);
    if pages > 0 && photographed as f64 >= PHOTOGRAPHED_SHARE * pages as f64 {
        info!(pages, photographed, "Receipt PDF is a photo, needs OCR");
        return ReceiptContent::NeedsOcr;
    }

    let text = match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "No text layer in receipt PDF, sending it to OCR");
            return ReceiptContent::NeedsOcr;
        }
    };
    let printed = text.chars().filter(|c| !c.is_whitespace()).count();
    if printed < MIN_TEXT_CHARS {
        info!(chars = printed, "Receipt PDF text layer is nearly empty, needs OCR");
        return ReceiptContent::NeedsOcr;
    }
    info!(chars = printed, pages, "Receipt text read from PDF");
    ReceiptContent::Text(text)
}

/// Share of photographed pages from which a PDF receipt counts as a photo.
const PHOTOGRAPHED_SHARE: f64 = 0.8;

/// Count the pages that carry a picture and no fonts, out of all pages.
fn photographed_pages(doc: &Document) -> (usize, usize) {
    let has_resource = |page: &lopdf::Dictionary, key: &[u8]| {
        page.get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resources)| resources.as_dict().ok())
            .and_then(|resources| resources.get(key).ok())
            .and_then(|entry| doc.dereference(entry).ok())
            .and_then(|(_, entry)| entry.as_dict().ok())
            .is_some_and(|dict| !dict.is_empty())
    };

    let pages = doc.get_pages();
    let photographed = pages
        .values()
        .filter_map(|&id| doc.get_dictionary(id).ok())
        .filter(|&page| has_resource(page, &b"XObject"[..]) && !has_resource(page, &b"Font"[..]))
        .count();
    (photographed, pages.len())
}
