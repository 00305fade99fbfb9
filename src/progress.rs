//! Progress-callback trait for compliance-scan events.
//!
//! Inject an [`Arc<dyn ScanProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks through requirement batches.
//!
//! # Example
//!
//! ```rust
//! use labelscan::{AnalysisConfig, ScanProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     items: AtomicUsize,
//! }
//!
//! impl ScanProgressCallback for CountingCallback {
//!     fn on_batch_complete(&self, batch_num: usize, total_batches: usize, item_count: usize) {
//!         self.items.fetch_add(item_count, Ordering::SeqCst);
//!         eprintln!("Batch {}/{} done", batch_num, total_batches);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { items: AtomicUsize::new(0) });
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(counter as Arc<dyn ScanProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the compliance orchestrator as it processes each batch.
///
/// Batches run strictly one after another, so events for a single scan never
/// interleave. Implementations must still be `Send + Sync` because the scan
/// future may be moved across worker threads between batches. All methods
/// default to no-ops.
pub trait ScanProgressCallback: Send + Sync {
    /// Called once before the first batch is sent.
    ///
    /// # Arguments
    /// * `total_batches`      — number of model calls the scan will issue
    /// * `total_requirements` — number of requirement labels being checked
    fn on_scan_start(&self, total_batches: usize, total_requirements: usize) {
        let _ = (total_batches, total_requirements);
    }

    /// Called just before the model request for a batch is sent.
    ///
    /// `batch_num` is 1-indexed.
    fn on_batch_start(&self, batch_num: usize, total_batches: usize) {
        let _ = (batch_num, total_batches);
    }

    /// Called when a batch's response has been parsed.
    ///
    /// # Arguments
    /// * `item_count` — number of requirement items the batch produced
    fn on_batch_complete(&self, batch_num: usize, total_batches: usize, item_count: usize) {
        let _ = (batch_num, total_batches, item_count);
    }

    /// Called when a batch fails. The scan stops after this event.
    fn on_batch_error(&self, batch_num: usize, total_batches: usize, error: &str) {
        let _ = (batch_num, total_batches, error);
    }

    /// Called once after the last batch completed successfully.
    fn on_scan_complete(&self, total_items: usize) {
        let _ = total_items;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ScanProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;
