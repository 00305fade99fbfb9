//! Word-set comparison of two paginated documents' text layers.
//!
//! Only meaningful when both inputs carry a text layer; raster images have
//! none, so [`compare_document_text`] returns `None` for them instead of an
//! empty diff.

use crate::document::Document;
use crate::error::LabelScanError;
use crate::output::WordDiff;
use crate::pipeline::render::PageRenderer;
use std::collections::HashSet;
use tracing::debug;

/// Words of `b` missing from `a` and vice versa.
///
/// Words are whitespace-separated and compared exactly. Each list keeps
/// first-occurrence order and holds no duplicates.
pub fn compare_words(a: &str, b: &str) -> WordDiff {
    WordDiff {
        missing_from_first: missing(b, a),
        missing_from_second: missing(a, b),
    }
}

fn missing(from: &str, against: &str) -> Vec<String> {
    let present: HashSet<&str> = against.split_whitespace().collect();
    let mut seen = HashSet::new();
    from.split_whitespace()
        .filter(|w| !present.contains(w) && seen.insert(*w))
        .map(str::to_string)
        .collect()
}

/// Compare the text of every page of two paginated documents.
pub fn compare_document_text(
    renderer: &dyn PageRenderer,
    a: &Document,
    b: &Document,
) -> Result<Option<WordDiff>, LabelScanError> {
    if !(a.is_paginated() && b.is_paginated()) {
        return Ok(None);
    }
    let text_a = renderer.extract_text(a.bytes())?;
    let text_b = renderer.extract_text(b.bytes())?;
    let diff = compare_words(&text_a, &text_b);
    debug!(
        "Word diff '{}' vs '{}': {} / {}",
        a.name(),
        b.name(),
        diff.missing_from_first.len(),
        diff.missing_from_second.len()
    );
    Ok(Some(diff))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    #[test]
    fn reports_both_directions() {
        let d = compare_words("sal açúcar farinha", "sal farinha leite");
        assert_eq!(d.missing_from_first, vec!["leite"]);
        assert_eq!(d.missing_from_second, vec!["açúcar"]);
    }

    #[test]
    fn no_duplicates_first_occurrence_order() {
        let d = compare_words("a", "z y z x y");
        assert_eq!(d.missing_from_first, vec!["z", "y", "x"]);
    }

    #[test]
    fn identical_text_is_empty() {
        assert!(compare_words("mesmo  texto\n", "texto mesmo").is_empty());
    }

    struct TextOnly;

    impl PageRenderer for TextOnly {
        fn render_page(
            &self,
            _bytes: &[u8],
            _page_index: usize,
            _scale: f32,
        ) -> Result<DynamicImage, LabelScanError> {
            Err(LabelScanError::Internal("not used".into()))
        }

        fn extract_text(&self, bytes: &[u8]) -> Result<String, LabelScanError> {
            Ok(String::from_utf8_lossy(&bytes[8..]).to_string())
        }
    }

    #[test]
    fn paginated_pair_is_compared() {
        let a = Document::new("a.pdf", b"%PDF-1.7 lote 12".to_vec(), "application/pdf").unwrap();
        let b = Document::new("b.pdf", b"%PDF-1.7 lote 13".to_vec(), "application/pdf").unwrap();
        let diff = compare_document_text(&TextOnly, &a, &b).unwrap().unwrap();
        assert_eq!(diff.missing_from_first, vec!["13"]);
        assert_eq!(diff.missing_from_second, vec!["12"]);
    }

    #[test]
    fn raster_input_yields_none() {
        let pdf = Document::new("a.pdf", b"%PDF-1.7 x".to_vec(), "application/pdf").unwrap();
        let png = Document::new("b.png", vec![0x89, b'P', b'N', b'G'], "image/png").unwrap();
        assert!(compare_document_text(&TextOnly, &pdf, &png).unwrap().is_none());
    }
}
