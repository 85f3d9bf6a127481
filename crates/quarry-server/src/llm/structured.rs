// crates/quarry-server/src/llm/structured.rs
// Structured output: schema derivation and tolerant extraction from raw text

use crate::error::{QuarryError, Result};
use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

/// Objects nested at most one level deep. Last resort for text the
/// incremental decoder rejects, e.g. a truncated outer wrapper.
static BRACE_OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    // SAFETY: static literal pattern; compilation cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("brace object regex")
});

/// A type an LLM can be asked to produce.
///
/// The JSON schema comes from `schemars`; `check` adds constraints the
/// schema cannot express cheaply (list lengths).
pub trait StructuredOutput: DeserializeOwned + JsonSchema + Send {
    /// Schema name sent to providers with native structured output
    const NAME: &'static str;

    fn check(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// JSON schema for `T`
pub fn schema_value<T: StructuredOutput>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

/// Instruction appended to the system prompt for providers without
/// native schema support
pub fn schema_hint<T: StructuredOutput>() -> String {
    let schema = serde_json::to_string_pretty(&schema_value::<T>()).unwrap_or_default();
    format!(
        "\n\nRespond with a single JSON object that matches this JSON schema. \
         Do not repeat the schema and do not add commentary.\n{}",
        schema
    )
}

/// Every syntactically complete top-level JSON object in `raw`, in order.
///
/// Starts an incremental decode at each `{`. A successful decode consumes
/// the object; a failed one advances a single character.
pub fn json_object_candidates(raw: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(offset) = raw[pos..].find('{') {
        let start = pos + offset;
        let mut decoder = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
        match decoder.next() {
            Some(Ok(Value::Object(_))) => {
                let end = start + decoder.byte_offset();
                found.push(&raw[start..end]);
                pos = end;
            }
            _ => pos = start + 1,
        }
    }
    found
}

fn validate<T: StructuredOutput>(candidate: &str) -> Option<T> {
    let value: T = serde_json::from_str(candidate).ok()?;
    match value.check() {
        Ok(()) => Some(value),
        Err(reason) => {
            debug!(schema = T::NAME, reason = %reason, "Candidate failed constraint check");
            None
        }
    }
}

/// Extract a `T` from raw model output.
///
/// Providers without schema enforcement sometimes echo the schema before
/// the answer, so candidates are tried from last to first.
pub fn extract<T: StructuredOutput>(raw: &str) -> Result<T> {
    let candidates = json_object_candidates(raw);
    if let Some(value) = candidates.iter().rev().find_map(|c| validate::<T>(c)) {
        return Ok(value);
    }

    let matches: Vec<&str> = BRACE_OBJECT_RE.find_iter(raw).map(|m| m.as_str()).collect();
    if let Some(value) = matches.iter().rev().find_map(|c| validate::<T>(c)) {
        debug!(schema = T::NAME, "Parsed structured output with regex fallback");
        return Ok(value);
    }

    Err(QuarryError::SchemaParse {
        reason: format!(
            "no JSON object matching {} ({} candidates examined)",
            T::NAME,
            candidates.len() + matches.len()
        ),
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Pair {
        left: String,
        right: u32,
    }

    impl StructuredOutput for Pair {
        const NAME: &'static str = "pair";

        fn check(&self) -> std::result::Result<(), String> {
            if self.right > 100 {
                return Err("right too large".into());
            }
            Ok(())
        }
    }

    // ========================================================================
    // Candidate scanning
    // ========================================================================

    #[test]
    fn test_candidates_in_order() {
        let raw = r#"noise {"a": 1} more {"b": {"c": 2}} tail"#;
        assert_eq!(json_object_candidates(raw), vec![r#"{"a": 1}"#, r#"{"b": {"c": 2}}"#]);
    }

    #[test]
    fn test_candidates_skip_broken_prefix() {
        let raw = r#"{"broken": {"left": "x", "right": 1}"#;
        // The outer object never closes; the inner one is complete
        assert_eq!(json_object_candidates(raw), vec![r#"{"left": "x", "right": 1}"#]);
    }

    #[test]
    fn test_candidates_handle_braces_in_strings() {
        let raw = r#"{"left": "a } b {", "right": 3}"#;
        assert_eq!(json_object_candidates(raw), vec![raw]);
    }

    #[test]
    fn test_no_candidates() {
        assert!(json_object_candidates("plain text").is_empty());
        assert!(json_object_candidates("").is_empty());
    }

    // ========================================================================
    // Extraction
    // ========================================================================

    #[test]
    fn test_extract_plain_object() {
        let pair: Pair = extract(r#"{"left": "x", "right": 7}"#).unwrap();
        assert_eq!(pair, Pair { left: "x".into(), right: 7 });
    }

    #[test]
    fn test_extract_prefers_answer_after_echoed_schema() {
        let raw = format!(
            "Here is the schema: {}\nAnswer: {{\"left\": \"real\", \"right\": 2}}",
            serde_json::to_string(&schema_value::<Pair>()).unwrap()
        );
        let pair: Pair = extract(&raw).unwrap();
        assert_eq!(pair.left, "real");
    }

    #[test]
    fn test_extract_prefers_last_valid_candidate() {
        let raw = r#"{"left": "first", "right": 1} then {"left": "second", "right": 2} {"other": true}"#;
        let pair: Pair = extract(raw).unwrap();
        assert_eq!(pair.left, "second");
    }

    #[test]
    fn test_extract_skips_candidates_failing_constraints() {
        let raw = r#"{"left": "ok", "right": 5} {"left": "too big", "right": 500}"#;
        let pair: Pair = extract(raw).unwrap();
        assert_eq!(pair.left, "ok");
    }

    #[test]
    fn test_extract_from_markdown_fence() {
        let raw = "```json\n{\"left\": \"fenced\", \"right\": 9}\n```";
        let pair: Pair = extract(raw).unwrap();
        assert_eq!(pair.right, 9);
    }

    #[test]
    fn test_extract_failure_carries_raw() {
        let err = extract::<Pair>("no json here").unwrap_err();
        match err {
            QuarryError::SchemaParse { raw, reason } => {
                assert_eq!(raw, "no json here");
                assert!(reason.contains("pair"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_schema_hint_mentions_fields() {
        let hint = schema_hint::<Pair>();
        assert!(hint.contains("\"left\""));
        assert!(hint.contains("\"right\""));
    }
}
