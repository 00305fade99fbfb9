//! Two-page analyses: transcription, difference report and unified verdict.
//!
//! Both comparisons follow the same shape. The two pages are transcribed
//! concurrently (no ordering between them), and only when both transcripts
//! are back is the combined analysis request sent. Three model calls in
//! total.
//!
//! ```text
//! page A ──▶ transcribe ─┐
//!                        ├──▶ analysis(text A, text B, A, B[, mask]) ──▶ result
//! page B ──▶ transcribe ─┘
//! ```

use crate::config::AnalysisConfig;
use crate::error::LabelScanError;
use crate::output::{DifferenceReport, UnifiedComparison};
use crate::pipeline::diff::DiffMask;
use crate::pipeline::encode::{encode_mask, encode_page, ImagePart};
use crate::pipeline::llm::{ModelRequest, VisionModel};
use crate::pipeline::render::RasterPage;
use crate::pipeline::structured::parse_structured;
use crate::prompts::{build_difference_prompt, build_unified_prompt, OCR_PROMPT};
use tracing::{debug, info};

/// Transcribe every visible character of a page.
pub async fn transcribe(
    model: &dyn VisionModel,
    page: &RasterPage,
    config: &AnalysisConfig,
) -> Result<String, LabelScanError> {
    let image = encode_page(page)?;
    transcribe_encoded(model, image, config).await
}

async fn transcribe_encoded(
    model: &dyn VisionModel,
    image: ImagePart,
    config: &AnalysisConfig,
) -> Result<String, LabelScanError> {
    let prompt = config.ocr_prompt.as_deref().unwrap_or(OCR_PROMPT);
    let response = model.complete(ModelRequest::text(prompt, vec![image])).await?;
    debug!("Transcribed {} chars", response.text.len());
    Ok(response.text)
}

/// Transcribe both pages concurrently. Fails if either transcription fails.
async fn transcribe_pair(
    model: &dyn VisionModel,
    a: ImagePart,
    b: ImagePart,
    config: &AnalysisConfig,
) -> Result<(String, String), LabelScanError> {
    futures::try_join!(
        transcribe_encoded(model, a, config),
        transcribe_encoded(model, b, config)
    )
}

/// Structured difference report between a reference page and a new version.
///
/// The mask is sent as a third image so the model can look where pixels
/// actually changed.
pub async fn run_difference_report(
    model: &dyn VisionModel,
    a: &RasterPage,
    b: &RasterPage,
    mask: &DiffMask,
    config: &AnalysisConfig,
) -> Result<DifferenceReport, LabelScanError> {
    info!(
        "Difference report: '{}' vs '{}' ({} flagged pixels)",
        a.source().name,
        b.source().name,
        mask.flagged_count()
    );
    let image_a = encode_page(a)?;
    let image_b = encode_page(b)?;
    let image_mask = encode_mask(mask)?;

    let (text_a, text_b) = transcribe_pair(model, image_a.clone(), image_b.clone(), config).await?;

    let request = ModelRequest::structured(
        build_difference_prompt(&text_a, &text_b),
        vec![image_a, image_b, image_mask],
    );
    let response = model.complete(request).await?;
    let report: DifferenceReport = parse_structured(&response.text)?;

    info!(
        "Difference report: different = {}, {} differences listed",
        report.are_different,
        report.differences.len()
    );
    Ok(report)
}

/// Free-text same/different verdict.
///
/// `has_differences` is true unless the summary contains
/// `config.equality_phrase` (case-insensitive). A model that paraphrases the
/// verdict is therefore read as "different".
pub async fn run_unified_comparison(
    model: &dyn VisionModel,
    a: &RasterPage,
    b: &RasterPage,
    config: &AnalysisConfig,
) -> Result<UnifiedComparison, LabelScanError> {
    info!(
        "Unified comparison: '{}' vs '{}'",
        a.source().name,
        b.source().name
    );
    let image_a = encode_page(a)?;
    let image_b = encode_page(b)?;

    let (text_a, text_b) = transcribe_pair(model, image_a.clone(), image_b.clone(), config).await?;

    let request = ModelRequest::text(build_unified_prompt(&text_a, &text_b), vec![image_a, image_b]);
    let summary = model.complete(request).await?.text;

    let has_differences = !contains_phrase(&summary, &config.equality_phrase);
    Ok(UnifiedComparison {
        has_differences,
        summary,
    })
}

/// Case-insensitive substring match.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.to_lowercase().contains(&phrase.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrase_match_ignores_case() {
        assert!(contains_phrase(
            "Veredito: AS IMAGENS SÃO IGUAIS.",
            "as imagens são iguais"
        ));
        assert!(!contains_phrase(
            "As imagens são diferentes: o lote mudou.",
            "as imagens são iguais"
        ));
    }

    #[test]
    fn paraphrase_reads_as_different() {
        assert!(!contains_phrase(
            "As duas imagens são idênticas.",
            "as imagens são iguais"
        ));
    }
}
