//! Pipeline stages for label comparison and analysis.
//!
//! Each submodule implements one transformation step and is testable on its
//! own. Only [`llm`] performs network I/O.
//!
//! ## Data Flow
//!
//! ```text
//!                       ┌─▶ diff ────┐
//! document ──▶ render ──┼─▶ overlay   ├─▶ encode ──▶ llm ──▶ structured
//!                       ├─▶ barcode   │
//!                       └─────────────┘
//! ```
//!
//! 1. [`render`]  rasterise an image or PDF page 1; CPU-bound, offloaded with
//!    `spawn_blocking` in async callers
//! 2. [`diff`]    luminance difference mask between two pages
//! 3. [`overlay`] letterboxed pan/zoom composition of two pages
//! 4. [`barcode`] QR Code / Code 128 / EAN-13 decoding behind a probe trait
//! 5. [`encode`]  PNG-encode and base64-wrap pages and masks
//! 6. [`llm`]     vision-model seam with retry/backoff
//! 7. [`structured`] strip markdown fences and parse JSON answers
//! 8. [`text`]    word-level comparison of PDF text layers

pub mod barcode;
pub mod diff;
pub mod encode;
pub mod llm;
pub mod overlay;
pub mod render;
pub mod structured;
pub mod text;
