//! # labelscan
//!
//! Compare product labels and check them against a labelling checklist.
//!
//! Two kinds of work live here. The pixel side is pure and local: documents
//! (PNG/JPEG images or the first page of a PDF) are rasterised, compared
//! pixel by pixel into a red difference mask, and laid over each other in a
//! pan/zoom viewport. The model side sends rasterised pages to a vision
//! language model: verbatim transcription, a batched compliance checklist,
//! and two flavours of "are these labels the same?" report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! path / URL
//!  │
//!  ├─ 1. Load       read or download, classify as image or PDF
//!  ├─ 2. Rasterise  decode, or render PDF page 1 at 6× via pdfium
//!  ├─ 3. Diff       BT.601 luminance, |L1 − L2| > 50 → red
//!  ├─ 4. Overlay    letterboxed layers, shared pan/zoom, opacity
//!  ├─ 5. Encode     PNG → base64 image parts
//!  └─ 6. Analyse    OCR, compliance batches, difference report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use labelscan::{
//!     default_requirements, load_document, run_compliance_scan, AnalysisConfig,
//!     LlmVisionModel, Rasterizer, VisionModel,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let config = AnalysisConfig::default();
//!     let doc = load_document("label.pdf", config.download_timeout_secs).await?;
//!     let page = Rasterizer::from_config(&config).rasterize(&doc)?;
//!
//!     let model: Arc<dyn VisionModel> = Arc::new(LlmVisionModel::from_config(&config)?);
//!     let items = run_compliance_scan(model, &page, &default_requirements(), &config).await?;
//!     for item in items {
//!         println!("{}: {}", item.requisito, item.status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `labelscan` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! labelscan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compliance;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compliance::{partition, run_compliance_scan, scan_stream, BatchResult, BatchStream};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use document::{load_document, Document, DocumentFormat};
pub use error::LabelScanError;
pub use output::{
    DifferenceReport, RequirementItem, RequirementStatus, StatusCounts, UnifiedComparison, WordDiff,
};
pub use pipeline::barcode::{describe_probe, BarcodeProbe, RxingBarcodeProbe};
pub use pipeline::diff::{diff, diff_with_config, diff_with_threshold, DiffMask};
pub use pipeline::encode::ImagePart;
pub use pipeline::llm::{resolve_provider, LlmVisionModel, ModelRequest, ModelResponse, VisionModel};
pub use pipeline::overlay::{composite, OverlayCompositor, OverlayEvent, OverlayFrame, ViewportTransform};
pub use pipeline::render::{rasterize, rasterize_async, PageRenderer, RasterPage, Rasterizer};
pub use pipeline::structured::{extract_structured_payload, parse_structured};
pub use pipeline::text::{compare_document_text, compare_words};
pub use progress::{NoopProgressCallback, ProgressCallback, ScanProgressCallback};
pub use prompts::default_requirements;
pub use report::{run_difference_report, run_unified_comparison, transcribe};
pub use session::{PagePair, Session, SessionEvent, Slot};
