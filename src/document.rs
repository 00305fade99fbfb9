//! Input documents: classification and loading from a path or URL.
//!
//! A [`Document`] is accepted once and never mutated. Classification happens
//! at construction, so every `Document` in the program is already known to be
//! either a raster image or a paginated document; anything else is rejected
//! with [`LabelScanError::UnsupportedFormat`] before rasterisation starts.
//!
//! The declared mime type wins when present (browsers and multipart uploads
//! supply one). Otherwise the first bytes are sniffed: `%PDF` for paginated
//! documents, and the `image` crate's magic-number table for images.

use crate::error::LabelScanError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// The two document families the rasteriser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentFormat {
    /// PNG, JPEG, ... decoded directly at natural size.
    RasterImage,
    /// PDF; only the first page is rendered.
    PaginatedDocument,
}

/// An immutable input document.
///
/// Cloning is cheap: the bytes are shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    mime_type: String,
    format: DocumentFormat,
    bytes: Arc<[u8]>,
}

impl Document {
    /// Accept a document with a declared mime type.
    ///
    /// An empty or generic (`application/octet-stream`) mime type falls back
    /// to sniffing the bytes.
    pub fn new(
        name: impl Into<String>,
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
    ) -> Result<Self, LabelScanError> {
        let name = name.into();
        if bytes.is_empty() {
            return Err(LabelScanError::MissingInput {
                what: format!("document '{name}' is empty"),
            });
        }

        let declared = mime_type.into();
        let declared = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let mime_type = if declared.is_empty() || declared == "application/octet-stream" {
            sniff_mime(&bytes)
                .map(str::to_string)
                .unwrap_or(declared)
        } else {
            declared
        };

        let format = classify(&mime_type)?;
        debug!("Accepted '{}' as {:?} ({})", name, format, mime_type);

        Ok(Self {
            name,
            mime_type,
            format,
            bytes: Arc::from(bytes),
        })
    }

    /// Accept a document whose type must be sniffed from its bytes.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, LabelScanError> {
        Self::new(name, bytes, "")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_paginated(&self) -> bool {
        self.format == DocumentFormat::PaginatedDocument
    }
}

/// Map a normalised mime type onto a document family.
pub fn classify(mime_type: &str) -> Result<DocumentFormat, LabelScanError> {
    if mime_type == "application/pdf" {
        Ok(DocumentFormat::PaginatedDocument)
    } else if mime_type.starts_with("image/") {
        Ok(DocumentFormat::RasterImage)
    } else {
        Err(LabelScanError::UnsupportedFormat {
            mime_type: if mime_type.is_empty() {
                "unknown".to_string()
            } else {
                mime_type.to_string()
            },
            detail: "neither an image nor a paginated document".to_string(),
        })
    }
}

/// Guess a mime type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a document from a local path or an HTTP/HTTPS URL.
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<Document, LabelScanError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<Document, LabelScanError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => LabelScanError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => LabelScanError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let mime = sniff_mime(&bytes)
        .or_else(|| mime_from_extension(path))
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Document::new(name, bytes, mime)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, LabelScanError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LabelScanError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            LabelScanError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            LabelScanError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(LabelScanError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let name = filename_from_url(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| LabelScanError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes ({})", bytes.len(), name);
    Document::new(name, bytes.to_vec(), content_type)
}

/// Extract a reasonable filename from the URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded".to_string()
}
