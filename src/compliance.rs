//! Compliance scan: check a label against a requirement checklist.
//!
//! The requirement list is cut into consecutive batches of at most
//! `AnalysisConfig::batch_size` (5 by default). Each batch is one structured
//! model request carrying the page image and only that batch's labels.
//! Batches run strictly one after another: batch *i+1* is not sent until
//! batch *i*'s response has been parsed. Results are concatenated in batch
//! order without reordering, deduplication or cross-batch validation.
//!
//! A failed batch fails the scan. [`scan_stream`] ends right after yielding
//! the error, and [`run_compliance_scan`] returns it without the items of
//! earlier batches.

use crate::config::AnalysisConfig;
use crate::error::LabelScanError;
use crate::output::RequirementItem;
use crate::pipeline::encode::{encode_page, ImagePart};
use crate::pipeline::llm::{ModelRequest, VisionModel};
use crate::pipeline::render::RasterPage;
use crate::pipeline::structured::parse_structured;
use crate::prompts::build_compliance_prompt;
use futures::future;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// The parsed answer for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// 1-indexed.
    pub batch_num: usize,
    pub total_batches: usize,
    pub requirements: Vec<String>,
    pub items: Vec<RequirementItem>,
}

/// A boxed stream of batch results, in batch order.
pub type BatchStream = Pin<Box<dyn Stream<Item = Result<BatchResult, LabelScanError>> + Send>>;

/// Split `requirements` into consecutive batches of at most `batch_size`.
///
/// A `batch_size` of 0 is treated as 1.
pub fn partition(requirements: &[String], batch_size: usize) -> Vec<Vec<String>> {
    requirements
        .chunks(batch_size.max(1))
        .map(<[String]>::to_vec)
        .collect()
}

/// Number of model calls a scan of `len` requirements issues.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    len.div_ceil(batch_size.max(1))
}

/// Scan a page, yielding each batch as soon as it has been parsed.
///
/// The page is encoded once up front; an encoding failure is returned
/// immediately instead of through the stream.
pub fn scan_stream(
    model: Arc<dyn VisionModel>,
    page: &RasterPage,
    requirements: &[String],
    config: &AnalysisConfig,
) -> Result<BatchStream, LabelScanError> {
    let image = encode_page(page)?;
    let batches = partition(requirements, config.batch_size);
    let total_batches = batches.len();

    info!(
        "Compliance scan of '{}': {} requirements in {} batches",
        page.source().name,
        requirements.len(),
        total_batches
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_start(total_batches, requirements.len());
        if total_batches == 0 {
            cb.on_scan_complete(0);
        }
    }

    let progress = config.progress_callback.clone();
    let produced = Arc::new(AtomicUsize::new(0));

    let s = stream::iter(batches.into_iter().enumerate())
        .then(move |(idx, batch)| {
            let model = Arc::clone(&model);
            let image = image.clone();
            let progress = progress.clone();
            let produced = Arc::clone(&produced);
            async move {
                let batch_num = idx + 1;
                if let Some(ref cb) = progress {
                    cb.on_batch_start(batch_num, total_batches);
                }

                let result = run_batch(model.as_ref(), image, &batch, batch_num, total_batches).await;

                match &result {
                    Ok(items) => {
                        let so_far = produced.fetch_add(items.len(), Ordering::SeqCst) + items.len();
                        if let Some(ref cb) = progress {
                            cb.on_batch_complete(batch_num, total_batches, items.len());
                            if batch_num == total_batches {
                                cb.on_scan_complete(so_far);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Batch {}/{} failed: {}", batch_num, total_batches, e);
                        if let Some(ref cb) = progress {
                            cb.on_batch_error(batch_num, total_batches, &e.to_string());
                        }
                    }
                }

                result.map(|items| BatchResult {
                    batch_num,
                    total_batches,
                    requirements: batch,
                    items,
                })
            }
        })
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        });

    Ok(Box::pin(s))
}

async fn run_batch(
    model: &dyn VisionModel,
    image: ImagePart,
    batch: &[String],
    batch_num: usize,
    total_batches: usize,
) -> Result<Vec<RequirementItem>, LabelScanError> {
    let request = ModelRequest::structured(build_compliance_prompt(batch), vec![image]);
    let response = model.complete(request).await?;
    debug!(
        "Batch {}/{}: {} output tokens",
        batch_num, total_batches, response.output_tokens
    );

    let items: Vec<RequirementItem> = parse_structured(&response.text)?;
    if items.len() != batch.len() {
        warn!(
            "Batch {}/{}: asked about {} requirements, model returned {} items",
            batch_num,
            total_batches,
            batch.len(),
            items.len()
        );
    }
    Ok(items)
}

/// Scan a page and return the merged checklist.
///
/// Issues `ceil(len / batch_size)` model calls. The first failing batch
/// aborts the scan; no partial checklist is returned.
pub async fn run_compliance_scan(
    model: Arc<dyn VisionModel>,
    page: &RasterPage,
    requirements: &[String],
    config: &AnalysisConfig,
) -> Result<Vec<RequirementItem>, LabelScanError> {
    let batches: Vec<BatchResult> = scan_stream(model, page, requirements, config)?
        .try_collect()
        .await?;

    let items: Vec<RequirementItem> = batches.into_iter().flat_map(|b| b.items).collect();
    info!("Compliance scan complete: {} items", items.len());
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reqs(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("R{i}")).collect()
    }

    #[test]
    fn thirteen_requirements_make_three_batches() {
        let batches = partition(&reqs(13), 5);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 5, 3]);
        assert_eq!(batches[2], vec!["R11", "R12", "R13"]);
        assert_eq!(batch_count(13, 5), 3);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        assert_eq!(partition(&reqs(10), 5).len(), 2);
        assert_eq!(batch_count(10, 5), 2);
    }

    #[test]
    fn empty_list_has_no_batches() {
        assert!(partition(&[], 5).is_empty());
        assert_eq!(batch_count(0, 5), 0);
    }

    #[test]
    fn zero_batch_size_is_treated_as_one() {
        assert_eq!(partition(&reqs(3), 0).len(), 3);
    }
}
