//! Structured-payload extraction from model text.
//!
//! Models asked for JSON often wrap it in a markdown fence:
//!
//! ````text
//! ```json
//! [ ... ]
//! ```
//! ````
//!
//! [`extract_structured_payload`] returns the body of the first
//! ```` ```json ```` fence when one is present and the trimmed raw text
//! otherwise. All fence handling lives here so loosening the pattern (bare
//! ```` ``` ````, CRLF line ends) is a one-function change.

use crate::error::LabelScanError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Longest excerpt of a bad payload quoted in errors.
const EXCERPT_CHARS: usize = 200;

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\n(.*?)\n```").expect("valid regex"));

/// The JSON body of a possibly fenced response.
pub fn extract_structured_payload(text: &str) -> &str {
    match JSON_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim(),
        None => text.trim(),
    }
}

/// Strip any fence and deserialize into `T`.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, LabelScanError> {
    let payload = extract_structured_payload(text);
    serde_json::from_str(payload).map_err(|e| {
        debug!("Unparseable structured payload ({} chars): {}", payload.len(), e);
        LabelScanError::MalformedStructuredResponse {
            detail: e.to_string(),
            excerpt: excerpt(payload),
        }
    })
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        requisito: String,
    }

    #[test]
    fn fenced_and_bare_parse_identically() {
        let bare = r#"[{"requisito":"Origem"},{"requisito":"Glúten"}]"#;
        let fenced = format!("```json\n{bare}\n```");

        let a: Vec<Item> = parse_structured(bare).unwrap();
        let b: Vec<Item> = parse_structured(&fenced).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn prose_around_fence_is_ignored() {
        let text = "Aqui está:\n```json\n{\"requisito\":\"Origem\"}\n```\nObrigado.";
        assert_eq!(extract_structured_payload(text), "{\"requisito\":\"Origem\"}");
    }

    #[test]
    fn multiline_body_is_captured() {
        let text = "```json\n[\n  {\"requisito\": \"A\"},\n  {\"requisito\": \"B\"}\n]\n```";
        let items: Vec<Item> = parse_structured(text).unwrap();
        assert_eq!(items[1].requisito, "B");
    }

    #[test]
    fn untagged_fence_falls_back_to_raw_text() {
        let text = "```\n[]\n```";
        assert_eq!(extract_structured_payload(text), text);
        assert!(parse_structured::<Vec<Item>>(text).is_err());
    }

    #[test]
    fn malformed_payload_reports_excerpt() {
        let err = parse_structured::<Vec<Item>>("not json at all").unwrap_err();
        match err {
            LabelScanError::MalformedStructuredResponse { excerpt, .. } => {
                assert_eq!(excerpt, "not json at all")
            }
            other => panic!("expected MalformedStructuredResponse, got {other:?}"),
        }
    }

    #[test]
    fn long_excerpt_is_truncated() {
        let long = "x".repeat(500);
        assert_eq!(excerpt(&long).chars().count(), EXCERPT_CHARS + 1);
    }
}
